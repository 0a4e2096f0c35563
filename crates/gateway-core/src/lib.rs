// ABOUTME: Core types and constants for the Coze gateway
// ABOUTME: Foundation crate with error handling, pagination, and constants
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![deny(unsafe_code)]

//! # Gateway Core
//!
//! Foundation crate providing shared types and constants for the Coze gateway.
//! This crate is designed to change infrequently, enabling incremental
//! compilation benefits in the workspace.
//!
//! ## Modules
//!
//! - **errors**: Unified error handling with `AppError` and `ErrorCode`
//! - **constants**: Application-wide constants organized by domain
//! - **pagination**: Page/size pagination for list endpoints

/// Unified error handling system with standard error codes and HTTP responses
pub mod errors;

/// Application constants and configuration values organized by domain
pub mod constants;

/// Page/size pagination for list endpoints
pub mod pagination;
