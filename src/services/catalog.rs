//! Book catalog service

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, CreateBook},
        user::UserClaims,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// List every book with its available quantity
    pub async fn list_books(&self) -> AppResult<Vec<Book>> {
        let mut session = self.repository.begin().await?;
        session.list_books().await
    }

    /// Add a book to the catalog (admin only)
    pub async fn create_book(&self, identity: &UserClaims, book: CreateBook) -> AppResult<Book> {
        identity.require_admin()?;
        book.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let mut session = self.repository.begin().await?;
        let created = session.insert_book(&book).await?;
        session.commit().await?;

        tracing::info!(book_id = created.id, isbn = %created.isbn, "Book created");
        Ok(created)
    }
}
