//! In-memory store for local runs and tests.
//!
//! Sessions are serialized behind a single async mutex. Each session works on
//! a copy of the state which replaces the shared state on commit, so a dropped
//! session leaves no trace.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Session, Store};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, CreateBook},
        borrow::{BorrowHistoryEntry, BorrowRequest, BorrowStatus, DateRange},
        user::{NewUser, User},
    },
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: BTreeMap<i32, User>,
    books: BTreeMap<i32, Book>,
    borrow_requests: BTreeMap<i32, BorrowRequest>,
    last_user_id: i32,
    last_book_id: i32,
    last_request_id: i32,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn Session>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemorySession { guard, working }))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

pub struct MemorySession {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl Session for MemorySession {
    async fn find_user_by_email(&mut self, email: &str) -> AppResult<Option<User>> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn insert_user(&mut self, user: &NewUser) -> AppResult<User> {
        if self.working.users.values().any(|u| u.email == user.email) {
            return Err(AppError::AlreadyExists("Email already exists".to_string()));
        }

        self.working.last_user_id += 1;
        let created = User {
            id: self.working.last_user_id,
            email: user.email.clone(),
            password: user.password_hash.clone(),
            role: user.role,
        };
        self.working.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list_books(&mut self) -> AppResult<Vec<Book>> {
        Ok(self.working.books.values().cloned().collect())
    }

    async fn get_book_for_update(&mut self, id: i32) -> AppResult<Option<Book>> {
        Ok(self.working.books.get(&id).cloned())
    }

    async fn insert_book(&mut self, book: &CreateBook) -> AppResult<Book> {
        if self.working.books.values().any(|b| b.isbn == book.isbn) {
            return Err(AppError::AlreadyExists(format!(
                "ISBN {} already exists",
                book.isbn
            )));
        }

        self.working.last_book_id += 1;
        let created = Book {
            id: self.working.last_book_id,
            title: book.title.clone(),
            author: book.author.clone(),
            isbn: book.isbn.clone(),
            quantity: book.quantity,
        };
        self.working.books.insert(created.id, created.clone());
        Ok(created)
    }

    async fn set_book_quantity(&mut self, id: i32, quantity: i32) -> AppResult<()> {
        let book = self
            .working
            .books
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;
        book.quantity = quantity;
        Ok(())
    }

    async fn get_borrow_request_for_update(&mut self, id: i32) -> AppResult<Option<BorrowRequest>> {
        Ok(self.working.borrow_requests.get(&id).cloned())
    }

    async fn list_borrow_requests(&mut self) -> AppResult<Vec<BorrowRequest>> {
        Ok(self.working.borrow_requests.values().cloned().collect())
    }

    async fn list_history_by_user(&mut self, user_id: i32) -> AppResult<Vec<BorrowHistoryEntry>> {
        let books = &self.working.books;
        Ok(self
            .working
            .borrow_requests
            .values()
            .filter(|r| r.user_id == user_id)
            .filter_map(|r| {
                books.get(&r.book_id).map(|book| BorrowHistoryEntry {
                    id: r.id,
                    book_title: book.title.clone(),
                    start_date: r.start_date,
                    end_date: r.end_date,
                    status: r.status,
                })
            })
            .collect())
    }

    async fn find_overlapping_approved(
        &mut self,
        book_id: i32,
        range: &DateRange,
        exclude_id: Option<i32>,
    ) -> AppResult<Option<BorrowRequest>> {
        Ok(self
            .working
            .borrow_requests
            .values()
            .filter(|r| Some(r.id) != exclude_id)
            .find(|r| {
                r.book_id == book_id
                    && r.status == BorrowStatus::Approved
                    && r.range().overlaps(range)
            })
            .cloned())
    }

    async fn insert_borrow_request(
        &mut self,
        user_id: i32,
        book_id: i32,
        range: &DateRange,
    ) -> AppResult<BorrowRequest> {
        if !self.working.books.contains_key(&book_id) {
            return Err(AppError::NotFound(format!("Book with id {} not found", book_id)));
        }

        self.working.last_request_id += 1;
        let created = BorrowRequest {
            id: self.working.last_request_id,
            user_id,
            book_id,
            start_date: range.start,
            end_date: range.end,
            status: BorrowStatus::Pending,
        };
        self.working.borrow_requests.insert(created.id, created.clone());
        Ok(created)
    }

    async fn set_borrow_status(&mut self, id: i32, status: BorrowStatus) -> AppResult<()> {
        let request = self
            .working
            .borrow_requests
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Request with id {} not found", id)))?;
        request.status = status;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemorySession { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
