//! Borrow request endpoints

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::{
    error::AppResult,
    models::borrow::{BorrowHistoryEntry, BorrowRequest, CreateBorrowRequest, UpdateBorrowStatus, DATE_FORMAT},
    AppState,
};

use super::{AuthenticatedUser, ValidJson};

const HISTORY_HEADER: [&str; 5] = ["Borrow ID", "Book Title", "Start Date", "End Date", "Status"];

/// Submit a borrow request
#[utoipa::path(
    post,
    path = "/borrow-requests",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = CreateBorrowRequest,
    responses(
        (status = 201, description = "Borrow request submitted", body = BorrowRequest),
        (status = 400, description = "Malformed dates"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book is already borrowed during this period"),
        (status = 422, description = "Book not available")
    )
)]
pub async fn create_borrow_request(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ValidJson(request): ValidJson<CreateBorrowRequest>,
) -> AppResult<(StatusCode, Json<BorrowRequest>)> {
    let created = state.services.borrows.create_request(&claims, request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// List all borrow requests
#[utoipa::path(
    get,
    path = "/borrow-requests",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All borrow requests", body = Vec<BorrowRequest>),
        (status = 403, description = "Admin privileges required")
    )
)]
pub async fn list_borrow_requests(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowRequest>>> {
    let requests = state.services.borrows.list_requests(&claims).await?;
    Ok(Json(requests))
}

/// Approve or deny a borrow request
#[utoipa::path(
    patch,
    path = "/borrow-requests/{id}",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Borrow request ID")
    ),
    request_body = UpdateBorrowStatus,
    responses(
        (status = 200, description = "Request updated", body = BorrowRequest),
        (status = 400, description = "Transition not allowed"),
        (status = 403, description = "Admin privileges required"),
        (status = 404, description = "Request not found"),
        (status = 422, description = "Book not available")
    )
)]
pub async fn update_borrow_status(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(request_id): Path<i32>,
    ValidJson(body): ValidJson<UpdateBorrowStatus>,
) -> AppResult<Json<BorrowRequest>> {
    let updated = state
        .services
        .borrows
        .set_status(&claims, request_id, body.status)
        .await?;
    Ok(Json(updated))
}

/// Download the caller's borrow history as CSV
#[utoipa::path(
    get,
    path = "/download-history",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "CSV attachment", content_type = "text/csv", body = String),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn download_history(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let entries = state.services.borrows.history(&claims).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=borrow_history.csv",
            ),
        ],
        history_csv(&entries),
    ))
}

fn history_csv(entries: &[BorrowHistoryEntry]) -> String {
    let mut out = csv_line(HISTORY_HEADER.iter().map(|s| s.to_string()));
    for entry in entries {
        out.push_str(&csv_line([
            entry.id.to_string(),
            entry.book_title.clone(),
            entry.start_date.format(DATE_FORMAT).to_string(),
            entry.end_date.format(DATE_FORMAT).to_string(),
            entry.status.to_string(),
        ]));
    }
    out
}

/// RFC 4180 line: fields containing separators, quotes or newlines are quoted
fn csv_line(fields: impl IntoIterator<Item = String>) -> String {
    let mut line = fields
        .into_iter()
        .map(|field| {
            if field.contains(&[',', '"', '\r', '\n'][..]) {
                format!("\"{}\"", field.replace('"', "\"\""))
            } else {
                field
            }
        })
        .collect::<Vec<_>>()
        .join(",");
    line.push_str("\r\n");
    line
}
