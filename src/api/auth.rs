//! Registration and login endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::user::{RegisterUser, UserInfo},
    AppState,
};

use super::ValidJson;

/// Login request
#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Login response with JWT token
#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterUser,
    responses(
        (status = 201, description = "User registered", body = UserInfo),
        (status = 400, description = "Missing or malformed email or password"),
        (status = 409, description = "Email already exists")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<RegisterUser>,
) -> AppResult<(StatusCode, Json<UserInfo>)> {
    let user = state.services.users.register(request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Authenticate and get a JWT token
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let token = state
        .services
        .users
        .login(&request.email, &request.password)
        .await?;

    Ok(Json(LoginResponse {
        access_token: token,
        token_type: "Bearer".to_string(),
    }))
}
