//! Borrowdesk Library Borrow Request Server
//!
//! Account registration and login, a book catalog with per-book copy counts,
//! and a borrow-request workflow in which admins approve or deny requests.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

impl AppState {
    /// Build the state on top of an already opened repository
    pub fn new(config: AppConfig, repository: repository::Repository) -> Self {
        let services = services::Services::new(
            repository,
            config.auth.clone(),
            config.borrows.clone(),
        );

        Self {
            config: Arc::new(config),
            services: Arc::new(services),
        }
    }
}
