// ABOUTME: Configuration module root
// ABOUTME: Environment-only configuration for the gateway
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Environment variable parsing into `ServerConfig`
pub mod environment;

pub use environment::ServerConfig;
