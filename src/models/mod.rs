//! Data models for Borrowdesk

pub mod book;
pub mod borrow;
pub mod user;

// Re-export commonly used types
pub use book::{Book, CreateBook};
pub use borrow::{BorrowHistoryEntry, BorrowRequest, BorrowStatus, DateRange};
pub use user::{Role, User, UserClaims};
