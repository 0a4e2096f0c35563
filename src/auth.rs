// ABOUTME: Session authentication: bcrypt password hashing and HS256 JWT issuance/validation
// ABOUTME: Produces the AuthResult every protected route handler works from
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Authentication and Session Management
//!
//! Sessions are stateless HS256 JWTs signed with the configured secret.
//! Password hashing runs on the blocking pool since bcrypt is CPU-bound.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::environment::AuthConfig;
use crate::errors::{AppError, AppResult};
use crate::models::User;

/// `JWT` claims for user sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User `ID`
    pub sub: String,
    /// Login name at issuance
    pub username: String,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    /// Authenticated user `ID`
    pub user_id: i64,
    /// Login name
    pub username: String,
}

/// Freshly issued session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedSession {
    /// Bearer token
    pub token: String,
    /// Expiry instant
    pub expires_at: DateTime<Utc>,
}

/// Authentication manager for `JWT` tokens and password hashes
#[derive(Clone)]
pub struct AuthManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiry: Duration,
    hash_cost: u32,
}

impl AuthManager {
    /// Create a new authentication manager
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            token_expiry: Duration::seconds(config.jwt_expiry_secs),
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Override the bcrypt cost (tests use the minimum)
    #[must_use]
    pub const fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    /// Generate a session token for a user
    ///
    /// # Errors
    ///
    /// Returns an internal error if JWT encoding fails
    pub fn generate_token(&self, user: &User) -> AppResult<IssuedSession> {
        let now = Utc::now();
        let expires_at = now + self.token_expiry;
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to sign session token: {e}")))?;

        Ok(IssuedSession { token, expires_at })
    }

    /// Validate a session token
    ///
    /// # Errors
    ///
    /// Returns an auth error if the token is expired, tampered with, or malformed
    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| Self::convert_jwt_error(&e))
    }

    /// Resolve a bearer token into the caller identity
    ///
    /// # Errors
    ///
    /// Returns an auth error for invalid tokens or non-numeric subjects
    pub fn authenticate(&self, token: &str) -> AppResult<AuthResult> {
        let claims = self.validate_token(token)?;
        let user_id = claims
            .sub
            .parse()
            .map_err(|_| AppError::auth_invalid("Token subject is not a user id"))?;
        Ok(AuthResult {
            user_id,
            username: claims.username,
        })
    }

    /// Convert JWT library errors to client-facing auth errors
    fn convert_jwt_error(e: &jsonwebtoken::errors::Error) -> AppError {
        use jsonwebtoken::errors::ErrorKind;
        warn!("JWT token validation failed: {e:?}");

        match e.kind() {
            ErrorKind::ExpiredSignature => AppError::auth_invalid("Session token expired"),
            ErrorKind::InvalidSignature => {
                AppError::auth_invalid("Token signature verification failed")
            }
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) => {
                AppError::auth_invalid("Token format is invalid")
            }
            _ => AppError::auth_invalid(format!("Token validation failed: {e}")),
        }
    }

    /// Hash a password on the blocking pool
    ///
    /// # Errors
    ///
    /// Returns an internal error if hashing fails
    pub async fn hash_password(&self, password: &str) -> AppResult<String> {
        let password = password.to_owned();
        let cost = self.hash_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AppError::internal(format!("Password hashing task failed: {e}")))?
            .map_err(|e| AppError::internal(format!("Password hashing failed: {e}")))
    }

    /// Check a password against its stored hash on the blocking pool
    ///
    /// A malformed hash counts as a mismatch.
    pub async fn verify_password(&self, password: &str, hash: &str) -> bool {
        let password = password.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || bcrypt::verify(&password, &hash).unwrap_or(false))
            .await
            .unwrap_or(false)
    }
}
