//! Book model and the inventory ledger

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Book row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub isbn: String,
    /// Copies currently available for approval
    pub quantity: i32,
}

impl Book {
    pub fn is_available(&self) -> bool {
        self.quantity > 0
    }

    /// Fails with `Unavailable` when no copy is left
    pub fn ensure_available(&self) -> AppResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(AppError::Unavailable(format!(
                "Book {} is not available",
                self.id
            )))
        }
    }

    /// Take one copy out of inventory
    pub fn decrement(&mut self) -> AppResult<()> {
        self.ensure_available()?;
        self.quantity -= 1;
        Ok(())
    }

    /// Put one copy back. No upper bound is enforced.
    pub fn increment(&mut self) {
        self.quantity += 1;
    }
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Author is required"))]
    pub author: String,
    #[validate(length(min = 1, message = "ISBN is required"))]
    pub isbn: String,
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: i32,
}
