//! Repository layer: the persistence interface and its backends

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::AppResult,
    models::{
        book::{Book, CreateBook},
        borrow::{BorrowHistoryEntry, BorrowRequest, BorrowStatus, DateRange},
        user::{NewUser, User},
    },
};

/// A storage backend able to open sessions
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Open a unit of work. Changes become visible only on [`Session::commit`].
    async fn begin(&self) -> AppResult<Box<dyn Session>>;

    /// Check the backend is reachable
    async fn ping(&self) -> AppResult<()>;
}

/// One unit of work against the store.
///
/// Rows read through the `*_for_update` methods stay locked until the
/// session is committed or dropped, so a read-check-write sequence on a
/// book's quantity cannot interleave with another session. Dropping a
/// session without committing discards its writes.
#[async_trait]
pub trait Session: Send {
    // Users

    async fn find_user_by_email(&mut self, email: &str) -> AppResult<Option<User>>;

    /// Fails with `AlreadyExists` on a duplicate email
    async fn insert_user(&mut self, user: &NewUser) -> AppResult<User>;

    // Books

    async fn list_books(&mut self) -> AppResult<Vec<Book>>;

    async fn get_book_for_update(&mut self, id: i32) -> AppResult<Option<Book>>;

    /// Fails with `AlreadyExists` on a duplicate ISBN
    async fn insert_book(&mut self, book: &CreateBook) -> AppResult<Book>;

    async fn set_book_quantity(&mut self, id: i32, quantity: i32) -> AppResult<()>;

    // Borrow requests

    async fn get_borrow_request_for_update(&mut self, id: i32) -> AppResult<Option<BorrowRequest>>;

    async fn list_borrow_requests(&mut self) -> AppResult<Vec<BorrowRequest>>;

    async fn list_history_by_user(&mut self, user_id: i32) -> AppResult<Vec<BorrowHistoryEntry>>;

    /// First approved request for `book_id` sharing a day with `range`,
    /// ignoring `exclude_id`
    async fn find_overlapping_approved(
        &mut self,
        book_id: i32,
        range: &DateRange,
        exclude_id: Option<i32>,
    ) -> AppResult<Option<BorrowRequest>>;

    /// Insert a request in `pending` state
    async fn insert_borrow_request(
        &mut self,
        user_id: i32,
        book_id: i32,
        range: &DateRange,
    ) -> AppResult<BorrowRequest>;

    async fn set_borrow_status(&mut self, id: i32, status: BorrowStatus) -> AppResult<()>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Handle on the configured store, shared by all services
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn Store>,
}

impl Repository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Repository backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(memory::MemoryStore::new()))
    }

    pub async fn begin(&self) -> AppResult<Box<dyn Session>> {
        self.store.begin().await
    }

    pub async fn ping(&self) -> AppResult<()> {
        self.store.ping().await
    }
}
