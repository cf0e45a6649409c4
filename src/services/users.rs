//! Registration and authentication service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{NewUser, RegisterUser, User, UserClaims, UserInfo},
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Register a new account
    pub async fn register(&self, request: RegisterUser) -> AppResult<UserInfo> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let user = NewUser {
            email: request.email.trim().to_string(),
            password_hash: self.hash_password(&request.password)?,
            role: request.role.unwrap_or_default(),
        };

        let mut session = self.repository.begin().await?;
        if session.find_user_by_email(&user.email).await?.is_some() {
            return Err(AppError::AlreadyExists("Email already exists".to_string()));
        }
        let created = session.insert_user(&user).await?;
        session.commit().await?;

        tracing::info!(user_id = created.id, role = %created.role, "User registered");
        Ok(created.into())
    }

    /// Authenticate by email and password and return a JWT token
    pub async fn login(&self, email: &str, password: &str) -> AppResult<String> {
        let invalid = || AppError::Authentication("Invalid credentials".to_string());

        let mut session = self.repository.begin().await?;
        let user = session
            .find_user_by_email(email.trim())
            .await?
            .ok_or_else(invalid)?;
        // Read-only: release the session before hashing
        drop(session);

        if !self.verify_password(&user, password)? {
            return Err(invalid());
        }

        self.create_token_for_user(&user)
    }

    fn create_token_for_user(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.email.clone(),
            user_id: user.id,
            role: user.role,
            exp,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    fn verify_password(&self, user: &User, password: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }
}
