// ABOUTME: Registration and login route handlers
// ABOUTME: Validates credentials, hashes passwords, and issues session tokens
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::auth::MIN_PASSWORD_LEN;
use crate::database::NewUser;
use crate::errors::{AppError, AppResult};
use crate::models::{User, UserStatus};
use crate::resources::ServerResources;
use crate::responses::ApiResponse;

/// Registration payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Unique login name
    pub username: String,
    /// Unique email address
    pub email: String,
    /// Plain-text password
    pub password: String,
    /// Display name
    #[serde(default)]
    pub nickname: Option<String>,
}

/// Login payload; `username` may also be the email address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Username or email
    pub username: String,
    /// Plain-text password
    pub password: String,
}

/// Login result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Session bearer token
    pub token: String,
    /// Session expiry
    pub expires_at: DateTime<Utc>,
    /// Authenticated user
    pub user: User,
}

impl RegisterRequest {
    fn validate(&self) -> AppResult<()> {
        if self.username.trim().is_empty() {
            return Err(AppError::invalid_input("Username is required"));
        }
        if !self.email.contains('@') {
            return Err(AppError::invalid_input("Email address is invalid"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::invalid_input(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// Authentication routes
pub struct AuthRoutes;

impl AuthRoutes {
    /// Create all authentication routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/auth/register", post(Self::register))
            .route("/api/auth/login", post(Self::login))
            .with_state(resources)
    }

    async fn register(
        State(resources): State<Arc<ServerResources>>,
        Json(request): Json<RegisterRequest>,
    ) -> AppResult<ApiResponse<User>> {
        request.validate()?;

        let password_hash = resources
            .auth_manager
            .hash_password(&request.password)
            .await?;
        let user = resources
            .database
            .create_user(&NewUser {
                username: request.username.trim().to_owned(),
                email: request.email.trim().to_lowercase(),
                password_hash,
                nickname: request.nickname,
            })
            .await?;

        info!(user_id = user.id, username = %user.username, "Registered user");
        Ok(ApiResponse::created(user))
    }

    async fn login(
        State(resources): State<Arc<ServerResources>>,
        Json(request): Json<LoginRequest>,
    ) -> AppResult<ApiResponse<LoginResponse>> {
        let invalid = || AppError::auth_invalid("Invalid username or password");

        let user = resources
            .database
            .get_user_by_login(request.username.trim())
            .await?
            .ok_or_else(invalid)?;

        if !resources
            .auth_manager
            .verify_password(&request.password, &user.password_hash)
            .await
        {
            return Err(invalid());
        }
        if user.status == UserStatus::Disabled {
            return Err(AppError::permission_denied("Account is disabled"));
        }

        let session = resources.auth_manager.generate_token(&user)?;
        info!(user_id = user.id, "User logged in");
        Ok(ApiResponse::ok(LoginResponse {
            token: session.token,
            expires_at: session.expires_at,
            user,
        }))
    }
}
