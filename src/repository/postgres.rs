//! PostgreSQL store

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Transaction};
use tracing::instrument;

use super::{Session, Store};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, CreateBook},
        borrow::{BorrowHistoryEntry, BorrowRequest, BorrowStatus, DateRange},
        user::{NewUser, User},
    },
};

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn Session>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSession { tx }))
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// A session is one database transaction
pub struct PgSession {
    tx: Transaction<'static, Postgres>,
}

/// Map unique violations to `AlreadyExists`, everything else to `Database`
fn unique_violation(e: sqlx::Error, message: String) -> AppError {
    let is_unique = e
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false);

    if is_unique {
        AppError::AlreadyExists(message)
    } else {
        AppError::Database(e)
    }
}

#[async_trait]
impl Session for PgSession {
    async fn find_user_by_email(&mut self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password, role FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self, user), fields(email = %user.email))]
    async fn insert_user(&mut self, user: &NewUser) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password, role)
            VALUES ($1, $2, $3)
            RETURNING id, email, password, role
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, "Email already exists".to_string()))
    }

    async fn list_books(&mut self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            "SELECT id, title, author, isbn, quantity FROM books ORDER BY id",
        )
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(books)
    }

    async fn get_book_for_update(&mut self, id: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(
            "SELECT id, title, author, isbn, quantity FROM books WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(book)
    }

    #[instrument(skip(self, book), fields(isbn = %book.isbn))]
    async fn insert_book(&mut self, book: &CreateBook) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, author, isbn, quantity)
            VALUES ($1, $2, $3, $4)
            RETURNING id, title, author, isbn, quantity
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(book.quantity)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, format!("ISBN {} already exists", book.isbn)))
    }

    async fn set_book_quantity(&mut self, id: i32, quantity: i32) -> AppResult<()> {
        let result = sqlx::query("UPDATE books SET quantity = $1 WHERE id = $2")
            .bind(quantity)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        Ok(())
    }

    async fn get_borrow_request_for_update(&mut self, id: i32) -> AppResult<Option<BorrowRequest>> {
        let request = sqlx::query_as::<_, BorrowRequest>(
            r#"
            SELECT id, user_id, book_id, start_date, end_date, status
            FROM borrow_requests
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(request)
    }

    async fn list_borrow_requests(&mut self) -> AppResult<Vec<BorrowRequest>> {
        let requests = sqlx::query_as::<_, BorrowRequest>(
            r#"
            SELECT id, user_id, book_id, start_date, end_date, status
            FROM borrow_requests
            ORDER BY id
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(requests)
    }

    async fn list_history_by_user(&mut self, user_id: i32) -> AppResult<Vec<BorrowHistoryEntry>> {
        let entries = sqlx::query_as::<_, BorrowHistoryEntry>(
            r#"
            SELECT r.id, b.title AS book_title, r.start_date, r.end_date, r.status
            FROM borrow_requests r
            JOIN books b ON b.id = r.book_id
            WHERE r.user_id = $1
            ORDER BY r.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(entries)
    }

    async fn find_overlapping_approved(
        &mut self,
        book_id: i32,
        range: &DateRange,
        exclude_id: Option<i32>,
    ) -> AppResult<Option<BorrowRequest>> {
        let request = sqlx::query_as::<_, BorrowRequest>(
            r#"
            SELECT id, user_id, book_id, start_date, end_date, status
            FROM borrow_requests
            WHERE book_id = $1
              AND status = 'approved'
              AND start_date <= $3
              AND end_date >= $2
              AND ($4::INTEGER IS NULL OR id <> $4)
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(book_id)
        .bind(range.start)
        .bind(range.end)
        .bind(exclude_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(request)
    }

    async fn insert_borrow_request(
        &mut self,
        user_id: i32,
        book_id: i32,
        range: &DateRange,
    ) -> AppResult<BorrowRequest> {
        let request = sqlx::query_as::<_, BorrowRequest>(
            r#"
            INSERT INTO borrow_requests (user_id, book_id, start_date, end_date, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, book_id, start_date, end_date, status
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(range.start)
        .bind(range.end)
        .bind(BorrowStatus::Pending)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(request)
    }

    async fn set_borrow_status(&mut self, id: i32, status: BorrowStatus) -> AppResult<()> {
        let result = sqlx::query("UPDATE borrow_requests SET status = $1 WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Request with id {} not found", id)));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
