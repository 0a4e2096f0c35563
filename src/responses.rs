// ABOUTME: Uniform success envelopes for all non-streaming HTTP responses
// ABOUTME: Wraps payloads as {code, message, data}, with {total, page, size} for paginated lists
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::pagination::Paginated;

/// Standard response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// HTTP status code mirrored in the body
    pub code: u16,
    /// Human-readable outcome
    pub message: String,
    /// Payload
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// `200 OK` with payload
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            message: "success".to_owned(),
            data,
        }
    }

    /// `201 Created` with payload
    #[must_use]
    pub fn created(data: T) -> Self {
        Self {
            code: StatusCode::CREATED.as_u16(),
            message: "created".to_owned(),
            data,
        }
    }

    /// Replace the outcome message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse<T> {
    /// HTTP status code mirrored in the body
    pub code: u16,
    /// Human-readable outcome
    pub message: String,
    /// Items of this page
    pub data: Vec<T>,
    /// Total matching items
    pub total: i64,
    /// Page number served
    pub page: u32,
    /// Page size served
    pub size: u32,
}

impl<T> From<Paginated<T>> for PageResponse<T> {
    fn from(page: Paginated<T>) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            message: "success".to_owned(),
            data: page.items,
            total: page.total,
            page: page.page,
            size: page.size,
        }
    }
}

impl<T: Serialize> IntoResponse for PageResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
