//! API integration tests against a running server

use reqwest::Client;
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080/api/v1";

/// Address unique to this run so tests can be repeated on the same database
fn unique(prefix: &str) -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{}-{}", prefix, nanos)
}

/// Helper to register an account and get its token
async fn get_auth_token(client: &Client, role: &str) -> String {
    let email = format!("{}@example.org", unique(role));

    let response = client
        .post(format!("{}/auth/register", BASE_URL))
        .json(&json!({
            "email": email,
            "password": "s3cret",
            "role": role
        }))
        .send()
        .await
        .expect("Failed to send register request");
    assert_eq!(response.status(), 201);

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "email": email,
            "password": "s3cret"
        }))
        .send()
        .await
        .expect("Failed to send login request");

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["access_token"].as_str().expect("No token in response").to_string()
}

async fn create_book(client: &Client, admin_token: &str, quantity: i32) -> i64 {
    let response = client
        .post(format!("{}/books", BASE_URL))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&json!({
            "title": "Test Book",
            "author": "Test Author",
            "isbn": unique("isbn"),
            "quantity": quantity
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse response");
    body["id"].as_i64().expect("No book ID")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_login() {
    let client = Client::new();
    let token = get_auth_token(&client, "user").await;
    assert!(!token.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "email": "nobody@example.org",
            "password": "wrong"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_list_books() {
    let client = Client::new();

    let response = client
        .get(format!("{}/books", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body.is_array());
}

#[tokio::test]
#[ignore]
async fn test_borrow_approve_deny() {
    let client = Client::new();
    let admin = get_auth_token(&client, "admin").await;
    let reader = get_auth_token(&client, "user").await;
    let book_id = create_book(&client, &admin, 1).await;

    let response = client
        .post(format!("{}/borrow-requests", BASE_URL))
        .header("Authorization", format!("Bearer {}", reader))
        .json(&json!({
            "book_id": book_id,
            "start_date": "2024-03-01",
            "end_date": "2024-03-05"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "pending");
    let request_id = body["id"].as_i64().expect("No request ID");

    let response = client
        .patch(format!("{}/borrow-requests/{}", BASE_URL, request_id))
        .header("Authorization", format!("Bearer {}", admin))
        .json(&json!({ "status": "approved" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 200);

    // Last copy is out
    let response = client
        .post(format!("{}/borrow-requests", BASE_URL))
        .header("Authorization", format!("Bearer {}", reader))
        .json(&json!({
            "book_id": book_id,
            "start_date": "2024-03-02",
            "end_date": "2024-03-03"
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 422);

    let response = client
        .patch(format!("{}/borrow-requests/{}", BASE_URL, request_id))
        .header("Authorization", format!("Bearer {}", admin))
        .json(&json!({ "status": "denied" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 200);
}

#[tokio::test]
#[ignore]
async fn test_download_history() {
    let client = Client::new();
    let token = get_auth_token(&client, "user").await;

    let response = client
        .get(format!("{}/download-history", BASE_URL))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/csv"
    );

    let body = response.text().await.expect("Failed to read body");
    assert!(body.starts_with("Borrow ID,Book Title,Start Date,End Date,Status"));
}

#[tokio::test]
#[ignore]
async fn test_unauthorized_access() {
    let client = Client::new();

    let response = client
        .get(format!("{}/borrow-requests", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_forbidden_for_non_admin() {
    let client = Client::new();
    let token = get_auth_token(&client, "user").await;

    let response = client
        .get(format!("{}/borrow-requests", BASE_URL))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 403);
}
