// ABOUTME: Bearer token extraction and validation for protected route handlers
// ABOUTME: Turns the Authorization header into an AuthResult or an auth error
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use http::header::AUTHORIZATION;
use http::HeaderMap;
use tracing::debug;

use crate::auth::{AuthManager, AuthResult};
use crate::errors::{AppError, AppResult};

/// Extract the bearer token from request headers
///
/// # Errors
///
/// Returns auth-required when the header is missing and auth-invalid when it
/// is not a `Bearer` credential
pub fn bearer_token(headers: &HeaderMap) -> AppResult<&str> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(AppError::auth_required)?
        .to_str()
        .map_err(|_| AppError::auth_invalid("Authorization header is not valid text"))?;

    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::auth_invalid("Authorization header must be a Bearer token"))?;
    Ok(token)
}

/// Authenticate a request from its headers
///
/// # Errors
///
/// Returns an auth error when the token is missing, malformed, or invalid
pub fn authenticate(headers: &HeaderMap, auth: &AuthManager) -> AppResult<AuthResult> {
    let result = auth.authenticate(bearer_token(headers)?)?;
    debug!(user_id = result.user_id, "Authenticated request");
    Ok(result)
}
