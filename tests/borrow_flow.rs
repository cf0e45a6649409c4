//! In-process API tests against the in-memory store

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use borrowdesk_server::{api, repository::Repository, AppConfig, AppState};

fn app() -> Router {
    api::create_router(AppState::new(AppConfig::default(), Repository::in_memory()))
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, token, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Register and log in, returning the bearer token
async fn account(app: &Router, email: &str, role: &str) -> String {
    let (status, _) = send_json(
        app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({ "email": email, "password": "s3cret", "role": role })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send_json(
        app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": email, "password": "s3cret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    body["access_token"].as_str().unwrap().to_string()
}

async fn add_book(app: &Router, admin: &str, isbn: &str, quantity: i32) -> i64 {
    let (status, body) = send_json(
        app,
        Method::POST,
        "/api/v1/books",
        Some(admin),
        Some(json!({ "title": "Dune", "author": "Frank Herbert", "isbn": isbn, "quantity": quantity })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

async fn borrow(app: &Router, token: &str, book_id: i64, start: &str, end: &str) -> (StatusCode, Value) {
    send_json(
        app,
        Method::POST,
        "/api/v1/borrow-requests",
        Some(token),
        Some(json!({ "book_id": book_id, "start_date": start, "end_date": end })),
    )
    .await
}

async fn set_status(app: &Router, token: &str, request_id: i64, status: &str) -> (StatusCode, Value) {
    send_json(
        app,
        Method::PATCH,
        &format!("/api/v1/borrow-requests/{}", request_id),
        Some(token),
        Some(json!({ "status": status })),
    )
    .await
}

async fn quantity(app: &Router, book_id: i64) -> i64 {
    let (_, books) = send_json(app, Method::GET, "/api/v1/books", None, None).await;
    books
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["id"].as_i64() == Some(book_id))
        .and_then(|b| b["quantity"].as_i64())
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = send_json(&app, Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send_json(&app, Method::GET, "/api/v1/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_register_errors() {
    let app = app();
    account(&app, "reader@example.org", "user").await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({ "email": "reader@example.org", "password": "other" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Duplicate");

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({ "email": "someone@example.org", "password": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "reader@example.org", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_or_bad_token() {
    let app = app();
    let (status, _) = send_json(&app, Method::GET, "/api/v1/borrow-requests", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send_json(&app, Method::GET, "/api/v1/borrow-requests", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_checked_against_configured_secret() {
    let issuer = app();
    let token = account(&issuer, "reader@example.org", "user").await;

    let mut config = AppConfig::default();
    config.auth.jwt_secret = "another-secret".to_string();
    let other = api::create_router(AppState::new(config, Repository::in_memory()));

    let (status, body) = send_json(&other, Method::GET, "/api/v1/borrow-requests", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthorized");
}

#[tokio::test]
async fn test_admin_only_routes() {
    let app = app();
    let reader = account(&app, "reader@example.org", "user").await;

    let (status, _) = send_json(&app, Method::GET, "/api/v1/borrow-requests", Some(&reader), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = set_status(&app, &reader, 1, "approved").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/api/v1/books",
        Some(&reader),
        Some(json!({ "title": "Dune", "author": "Frank Herbert", "isbn": "1", "quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_overlap_conflict() {
    let app = app();
    let admin = account(&app, "admin@example.org", "admin").await;
    let reader = account(&app, "reader@example.org", "user").await;
    let book = add_book(&app, &admin, "111", 5).await;

    let (_, first) = borrow(&app, &reader, book, "2024-01-01", "2024-01-10").await;
    let (status, _) = set_status(&app, &admin, first["id"].as_i64().unwrap(), "approved").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = borrow(&app, &reader, book, "2024-01-05", "2024-01-06").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "PeriodAlreadyBorrowed");

    let (status, body) = borrow(&app, &reader, book, "2024-01-11", "2024-01-20").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
}

#[tokio::test]
async fn test_malformed_dates() {
    let app = app();
    let admin = account(&app, "admin@example.org", "admin").await;
    let book = add_book(&app, &admin, "111", 1).await;

    let (status, body) = borrow(&app, &admin, book, "03/01/2024", "2024-03-05").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
}

#[tokio::test]
async fn test_malformed_bodies_are_bad_values() {
    let app = app();
    let admin = account(&app, "admin@example.org", "admin").await;
    let book = add_book(&app, &admin, "111", 1).await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/v1/borrow-requests",
        Some(&admin),
        Some(json!({ "start_date": "2024-03-01", "end_date": "2024-03-05" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");

    let (status, request) = borrow(&app, &admin, book, "2024-03-01", "2024-03-05").await;
    assert_eq!(status, StatusCode::CREATED);
    let request_id = request["id"].as_i64().unwrap();

    let (status, body) = set_status(&app, &admin, request_id, "lost").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "admin@example.org" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
}

#[tokio::test]
async fn test_pending_is_not_a_status_target() {
    let app = app();
    let admin = account(&app, "admin@example.org", "admin").await;
    let book = add_book(&app, &admin, "111", 1).await;

    let (_, request) = borrow(&app, &admin, book, "2024-03-01", "2024-03-05").await;
    let request_id = request["id"].as_i64().unwrap();

    let (status, body) = set_status(&app, &admin, request_id, "pending").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
    assert_eq!(quantity(&app, book).await, 1);
}

#[tokio::test]
async fn test_end_to_end_last_copy() {
    let app = app();
    let admin = account(&app, "admin@example.org", "admin").await;
    let reader = account(&app, "reader@example.org", "user").await;
    let book = add_book(&app, &admin, "111", 1).await;

    let (status, request) = borrow(&app, &reader, book, "2024-03-01", "2024-03-05").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(request["status"], "pending");
    assert_eq!(request["start_date"], "2024-03-01");
    let request_id = request["id"].as_i64().unwrap();

    let (status, updated) = set_status(&app, &admin, request_id, "approved").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "approved");
    assert_eq!(quantity(&app, book).await, 0);

    let (status, body) = borrow(&app, &reader, book, "2024-03-02", "2024-03-03").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "BookNotAvailable");

    let (status, _) = set_status(&app, &admin, request_id, "denied").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quantity(&app, book).await, 1);

    let (status, _) = set_status(&app, &admin, request_id, "approved").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = set_status(&app, &admin, 999, "approved").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_requests_as_admin() {
    let app = app();
    let admin = account(&app, "admin@example.org", "admin").await;
    let reader = account(&app, "reader@example.org", "user").await;
    let book = add_book(&app, &admin, "111", 2).await;

    borrow(&app, &reader, book, "2024-01-01", "2024-01-02").await;
    borrow(&app, &reader, book, "2024-02-01", "2024-02-02").await;

    let (status, body) = send_json(&app, Method::GET, "/api/v1/borrow-requests", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let requests = body.as_array().unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r["book_id"].as_i64() == Some(book)));
}

#[tokio::test]
async fn test_download_history() {
    let app = app();
    let admin = account(&app, "admin@example.org", "admin").await;
    let reader = account(&app, "reader@example.org", "user").await;
    let book = add_book(&app, &admin, "111", 2).await;

    let (_, request) = borrow(&app, &reader, book, "2024-03-01", "2024-03-05").await;
    borrow(&app, &admin, book, "2024-04-01", "2024-04-05").await;

    let (status, bytes) = send(&app, Method::GET, "/api/v1/download-history", Some(&reader), None).await;
    assert_eq!(status, StatusCode::OK);

    let csv = String::from_utf8(bytes).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "Borrow ID,Book Title,Start Date,End Date,Status");
    assert_eq!(
        lines[1],
        format!("{},Dune,2024-03-01,2024-03-05,pending", request["id"])
    );
    assert_eq!(lines.len(), 2);
}
