// ABOUTME: HTTP middleware for authentication and cross-origin access
// ABOUTME: Bearer token extraction for handlers and the CORS layer for the router
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Bearer token authentication
pub mod auth;
/// CORS layer
pub mod cors;

pub use auth::authenticate;
pub use cors::setup_cors;
