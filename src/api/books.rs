//! Book catalog endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AppResult,
    models::book::{Book, CreateBook},
    AppState,
};

use super::{AuthenticatedUser, ValidJson};

/// List all books with available quantities
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    responses(
        (status = 200, description = "List of books", body = Vec<Book>)
    )
)]
pub async fn list_books(State(state): State<AppState>) -> AppResult<Json<Vec<Book>>> {
    let books = state.services.catalog.list_books().await?;
    Ok(Json(books))
}

/// Add a book to the catalog
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin privileges required"),
        (status = 409, description = "ISBN already exists")
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ValidJson(book): ValidJson<CreateBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let created = state.services.catalog.create_book(&claims, book).await?;
    Ok((StatusCode::CREATED, Json(created)))
}
