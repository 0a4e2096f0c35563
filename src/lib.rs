// ABOUTME: Main library entry point for the Coze backend-for-frontend gateway
// ABOUTME: Exposes accounts, agents, conversation history, and streamed relays to the Coze API
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![deny(unsafe_code)]

//! # Coze Gateway
//!
//! A backend-for-frontend service sitting between web clients and the Coze
//! agent API. It owns user accounts, agent records, and conversation
//! history, and relays chat turns and workflow runs to the upstream service
//! as Server-Sent Events.
//!
//! ## Architecture
//!
//! - **Credential cache**: one shared upstream access token, issued through
//!   the JWT-bearer grant and cached in memory or Redis
//! - **Upstream client**: typed calls to the Coze HTTP API with stream
//!   events normalized into [`upstream::StreamEvent`]
//! - **Stream relay**: per-turn orchestration that persists the user
//!   message, forwards normalized events to the client, and persists the
//!   assistant reply once the upstream finishes
//! - **HTTP surface**: axum routes under `/api` with bearer-token sessions
//!
//! ## Quick Start
//!
//! ```bash
//! export COZE_CLIENT_ID=... COZE_PUBLIC_KEY_ID=... COZE_PRIVATE_KEY_FILE_PATH=./private.pem
//! export COZE_BOT_ID=... JWT_SECRET=...
//! cargo run --bin coze-gateway
//! ```

/// Session tokens and password hashing
pub mod auth;

/// Shared key-value cache backends
pub mod cache;

/// Environment-driven configuration
pub mod config;

/// Application constants
pub mod constants;

/// `SQLite` persistence for users, agents, conversations, and messages
pub mod database;

/// Unified error handling
pub mod errors;

/// Structured logging setup
pub mod logging;

/// Request-level helpers: bearer authentication and CORS
pub mod middleware;

/// Domain records
pub mod models;

/// Page/size pagination
pub mod pagination;

/// Turn orchestration between clients and the upstream stream
pub mod relay;

/// Shared server resources
pub mod resources;

/// Success response envelopes
pub mod responses;

/// HTTP route handlers
pub mod routes;

/// HTTP server assembly
pub mod server;

/// Upstream agent API client
pub mod upstream;
