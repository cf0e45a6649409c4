//! Business logic services

pub mod borrows;
pub mod catalog;
pub mod users;

use crate::{
    config::{AuthConfig, BorrowsConfig},
    repository::Repository,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub users: users::UsersService,
    pub catalog: catalog::CatalogService,
    pub borrows: borrows::BorrowsService,
    repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, auth_config: AuthConfig, borrows_config: BorrowsConfig) -> Self {
        Self {
            users: users::UsersService::new(repository.clone(), auth_config),
            catalog: catalog::CatalogService::new(repository.clone()),
            borrows: borrows::BorrowsService::new(repository.clone(), borrows_config),
            repository,
        }
    }

    /// Check the underlying store is reachable
    pub async fn ping(&self) -> crate::error::AppResult<()> {
        self.repository.ping().await
    }
}
