//! Borrow request workflow
//!
//! A request is created `pending` when the book exists, has a copy left and
//! no approved request for that book covers any of the requested days.
//! Inventory only moves when an admin approves (one copy out) or denies an
//! approved request (one copy back). Every operation runs in a single
//! session, so the status write and the quantity write land together.

use crate::{
    config::BorrowsConfig,
    error::{AppError, AppResult},
    models::{
        borrow::{
            BorrowHistoryEntry, BorrowRequest, BorrowStatus, CreateBorrowRequest, DateRange,
            InventoryEffect,
        },
        user::UserClaims,
    },
    repository::{Repository, Session},
};

#[derive(Clone)]
pub struct BorrowsService {
    repository: Repository,
    config: BorrowsConfig,
}

impl BorrowsService {
    pub fn new(repository: Repository, config: BorrowsConfig) -> Self {
        Self { repository, config }
    }

    /// Submit a borrow request for the caller
    pub async fn create_request(
        &self,
        identity: &UserClaims,
        request: CreateBorrowRequest,
    ) -> AppResult<BorrowRequest> {
        let range = DateRange::parse(&request.start_date, &request.end_date)?;

        let mut session = self.repository.begin().await?;

        let book = session
            .get_book_for_update(request.book_id)
            .await?
            .ok_or_else(|| book_not_found(request.book_id))?;

        if let Err(e) = book.ensure_available() {
            tracing::warn!(book_id = book.id, "Borrow request rejected: no copy left");
            return Err(e);
        }

        ensure_no_overlap(&mut *session, book.id, &range, None).await?;

        let created = session
            .insert_borrow_request(identity.user_id, book.id, &range)
            .await?;
        session.commit().await?;

        tracing::info!(
            request_id = created.id,
            user_id = created.user_id,
            book_id = created.book_id,
            "Borrow request submitted"
        );
        Ok(created)
    }

    /// List every borrow request (admin only)
    pub async fn list_requests(&self, identity: &UserClaims) -> AppResult<Vec<BorrowRequest>> {
        identity.require_admin()?;

        let mut session = self.repository.begin().await?;
        session.list_borrow_requests().await
    }

    /// Approve or deny a request (admin only)
    pub async fn set_status(
        &self,
        identity: &UserClaims,
        request_id: i32,
        status: BorrowStatus,
    ) -> AppResult<BorrowRequest> {
        identity.require_admin()?;

        let mut session = self.repository.begin().await?;

        let mut request = session
            .get_borrow_request_for_update(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Request with id {} not found", request_id)))?;

        let effect = request.status.transition_to(status)?;

        match effect {
            InventoryEffect::Unchanged => return Ok(request),
            InventoryEffect::None => {}
            InventoryEffect::TakeCopy => {
                let mut book = session
                    .get_book_for_update(request.book_id)
                    .await?
                    .ok_or_else(|| book_not_found(request.book_id))?;

                if let Err(e) = book.decrement() {
                    tracing::warn!(request_id, book_id = book.id, "Approval rejected: no copy left");
                    return Err(e);
                }

                if self.config.enforce_overlap_on_approval {
                    ensure_no_overlap(&mut *session, book.id, &request.range(), Some(request.id))
                        .await?;
                }

                session.set_book_quantity(book.id, book.quantity).await?;
            }
            InventoryEffect::ReturnCopy => {
                let mut book = session
                    .get_book_for_update(request.book_id)
                    .await?
                    .ok_or_else(|| book_not_found(request.book_id))?;

                book.increment();
                session.set_book_quantity(book.id, book.quantity).await?;
            }
        }

        session.set_borrow_status(request.id, status).await?;
        session.commit().await?;

        tracing::info!(
            request_id,
            from = %request.status,
            to = %status,
            "Borrow request status changed"
        );

        request.status = status;
        Ok(request)
    }

    /// The caller's borrow history, oldest first
    pub async fn history(&self, identity: &UserClaims) -> AppResult<Vec<BorrowHistoryEntry>> {
        let mut session = self.repository.begin().await?;
        session.list_history_by_user(identity.user_id).await
    }
}

fn book_not_found(book_id: i32) -> AppError {
    AppError::NotFound(format!("Book with id {} not found", book_id))
}

/// Fails with `Conflict` when an approved request for the book shares a day
/// with `range`
async fn ensure_no_overlap(
    session: &mut dyn Session,
    book_id: i32,
    range: &DateRange,
    exclude_id: Option<i32>,
) -> AppResult<()> {
    match session
        .find_overlapping_approved(book_id, range, exclude_id)
        .await?
    {
        Some(existing) => {
            tracing::warn!(
                book_id,
                conflicting_request = existing.id,
                "Requested period overlaps an approved borrow"
            );
            Err(AppError::Conflict(
                "Book is already borrowed during this period".to_string(),
            ))
        }
        None => Ok(()),
    }
}
