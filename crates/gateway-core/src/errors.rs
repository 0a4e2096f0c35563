// ABOUTME: Unified error handling with standard error codes and HTTP status mapping
// ABOUTME: Defines AppError, ErrorCode, and the JSON error envelope returned to clients
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Error Handling
//!
//! Every fallible operation in the gateway returns [`AppResult`]. An [`AppError`]
//! carries a closed [`ErrorCode`] that determines both the HTTP status and the
//! category a caller can branch on:
//!
//! | Category | Codes |
//! |---|---|
//! | configuration | `ConfigError` |
//! | upstream unavailable | `ExternalServiceUnavailable`, `ExternalServiceError` |
//! | upstream protocol | `UpstreamProtocolError` |
//! | persistence | `DatabaseError` |
//!
//! A client disconnecting from a stream is not an error and has no code.

use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard error codes used throughout the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication & Authorization
    /// Authentication is required but missing
    AuthRequired,
    /// Authentication credentials are invalid or expired
    AuthInvalid,
    /// Authenticated caller may not touch this resource
    PermissionDenied,

    // Validation
    /// Request data failed validation
    InvalidInput,
    /// A required field was not supplied
    MissingRequiredField,

    // Resources
    /// The requested resource does not exist
    ResourceNotFound,
    /// The resource already exists
    ResourceAlreadyExists,

    // Configuration
    /// Required configuration is missing or invalid
    ConfigError,

    // Upstream
    /// Upstream returned an error response
    ExternalServiceError,
    /// Upstream could not be reached or timed out
    ExternalServiceUnavailable,
    /// Upstream sent something that could not be interpreted
    UpstreamProtocolError,

    // Internal
    /// Database read or write failed
    DatabaseError,
    /// Unexpected internal failure
    InternalError,
}

impl ErrorCode {
    /// HTTP status code for this error
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::AuthRequired | Self::AuthInvalid => 401,
            Self::PermissionDenied => 403,
            Self::InvalidInput | Self::MissingRequiredField => 400,
            Self::ResourceNotFound => 404,
            Self::ResourceAlreadyExists => 409,
            Self::ExternalServiceError | Self::UpstreamProtocolError => 502,
            Self::ExternalServiceUnavailable => 503,
            Self::ConfigError | Self::DatabaseError | Self::InternalError => 500,
        }
    }

    /// User-facing description of this error class
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::AuthRequired => "Authentication is required",
            Self::AuthInvalid => "Authentication credentials are invalid",
            Self::PermissionDenied => "Permission denied",
            Self::InvalidInput => "Invalid input",
            Self::MissingRequiredField => "A required field is missing",
            Self::ResourceNotFound => "Resource not found",
            Self::ResourceAlreadyExists => "Resource already exists",
            Self::ConfigError => "Server configuration error",
            Self::ExternalServiceError => "Upstream agent service returned an error",
            Self::ExternalServiceUnavailable => "Upstream agent service is unavailable",
            Self::UpstreamProtocolError => "Upstream agent service sent an invalid response",
            Self::DatabaseError => "Database operation failed",
            Self::InternalError => "Internal server error",
        }
    }

    /// Whether the message of this error may leak internals and must be masked
    #[must_use]
    pub const fn is_internal(self) -> bool {
        matches!(self, Self::DatabaseError | Self::InternalError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Application error with code, message and optional source
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AppError {
    /// Error classification
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Underlying cause, if any
    #[source]
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

/// Result alias used across the gateway
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a new error with a code and message
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Attach an underlying cause
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// HTTP status of this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Authentication missing
    #[must_use]
    pub fn auth_required() -> Self {
        Self::new(ErrorCode::AuthRequired, "Authentication is required")
    }

    /// Authentication invalid
    #[must_use]
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthInvalid, message)
    }

    /// Caller is authenticated but not allowed
    #[must_use]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    /// Resource not found
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Resource already exists
    #[must_use]
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceAlreadyExists, message)
    }

    /// Invalid request input
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Missing or invalid configuration
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Upstream replied with an error
    #[must_use]
    pub fn external_service(service: &str, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ExternalServiceError,
            format!("{service}: {}", message.into()),
        )
    }

    /// Upstream unreachable or timed out
    #[must_use]
    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExternalServiceUnavailable, message)
    }

    /// Upstream reply could not be interpreted
    #[must_use]
    pub fn upstream_protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamProtocolError, message)
    }

    /// Persistence failure
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Unexpected internal failure
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Message safe to show to clients
    #[must_use]
    pub fn client_message(&self) -> String {
        if self.code.is_internal() {
            self.code.description().to_owned()
        } else {
            self.message.clone()
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON serialization failed: {err}")).with_source(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(format!("I/O error: {err}")).with_source(err)
    }
}

#[cfg(feature = "database-errors")]
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found("Record"),
            other => Self::database(format!("Database error: {other}")).with_source(other),
        }
    }
}

#[cfg(feature = "provider-errors")]
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::upstream_unavailable(format!("Upstream request failed: {err}")).with_source(err)
        } else if err.is_decode() {
            Self::upstream_protocol(format!("Upstream response could not be decoded: {err}"))
                .with_source(err)
        } else {
            Self::external_service("coze", err.to_string()).with_source(err)
        }
    }
}

/// JSON body of every error response: `{code, message, error}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Numeric HTTP status
    pub code: u16,
    /// Human-readable message
    pub message: String,
    /// Machine-readable error class
    pub error: ErrorCode,
}

impl From<&AppError> for ErrorEnvelope {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.http_status(),
            message: err.client_message(),
            error: err.code,
        }
    }
}

#[cfg(feature = "http-response")]
mod http_response {
    use axum::response::{IntoResponse, Response};
    use axum::Json;
    use http::StatusCode;
    use tracing::error;

    use super::{AppError, ErrorEnvelope};

    impl IntoResponse for AppError {
        fn into_response(self) -> Response {
            if self.code.is_internal() {
                error!(code = ?self.code, "request failed: {}", self.message);
            }
            let status = StatusCode::from_u16(self.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(ErrorEnvelope::from(&self))).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_statuses() {
        assert_eq!(AppError::config("no key").http_status(), 500);
        assert_eq!(AppError::upstream_unavailable("down").http_status(), 503);
        assert_eq!(AppError::upstream_protocol("bad frame").http_status(), 502);
        assert_eq!(AppError::not_found("Conversation").http_status(), 404);
    }

    #[test]
    fn internal_messages_are_masked() {
        let err = AppError::database("UNIQUE constraint failed: users.email");
        let envelope = ErrorEnvelope::from(&err);
        assert_eq!(envelope.message, "Database operation failed");
        assert_eq!(envelope.code, 500);

        let err = AppError::invalid_input("content must not be empty");
        assert_eq!(ErrorEnvelope::from(&err).message, "content must not be empty");
    }
}
