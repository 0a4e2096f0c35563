// ABOUTME: Tests for environment-driven server configuration
// ABOUTME: Mutates process environment, so every test runs serially
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use coze_gateway::config::environment::{DatabaseUrl, Environment, ServerConfig};
use serial_test::serial;

const VARS: &[&str] = &[
    "ENVIRONMENT",
    "HOST",
    "HTTP_PORT",
    "DATABASE_URL",
    "REDIS_URL",
    "CACHE_MAX_ENTRIES",
    "JWT_SECRET",
    "JWT_EXPIRY_SECS",
    "CORS_ALLOWED_ORIGINS",
    "COZE_API_URL",
    "COZE_BOT_ID",
    "COZE_WORKFLOW_ID",
    "COZE_CLIENT_ID",
    "COZE_PUBLIC_KEY_ID",
    "COZE_PRIVATE_KEY",
    "COZE_PRIVATE_KEY_FILE_PATH",
    "COZE_TOKEN_TTL_SECS",
    "COZE_TOKEN_CACHE_TTL_SECS",
    "COZE_REQUEST_TIMEOUT_SECS",
    "RELAY_HISTORY_WINDOW",
    "RELAY_SAVE_PARTIAL_ON_DISCONNECT",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_defaults() {
    clear_env();
    let config = ServerConfig::from_env().unwrap();

    assert_eq!(config.environment, Environment::Development);
    assert_eq!(config.http_port, 8080);
    assert_eq!(
        config.database.to_connection_string(),
        "sqlite:./data/coze_gateway.db"
    );
    assert!(config.cache.redis_url.is_none());
    assert_eq!(config.cache.max_entries, 1000);
    assert_eq!(config.auth.jwt_expiry_secs, 7200);
    assert!(!config.auth.jwt_secret.is_empty());
    assert_eq!(config.coze.api_url, "https://api.coze.cn");
    assert_eq!(config.coze.token_ttl, Duration::from_secs(900));
    assert_eq!(config.coze.token_cache_ttl, Duration::from_secs(840));
    assert_eq!(config.coze.request_timeout, Duration::from_secs(120));
    assert!(config.coze.private_key.is_none());
    assert_eq!(config.relay.history_window, 20);
    assert!(!config.relay.save_partial_on_disconnect);
    assert_eq!(config.cors.allowed_origins, "*");
}

#[test]
#[serial]
fn test_overrides() {
    clear_env();
    env::set_var("HTTP_PORT", "9090");
    env::set_var("DATABASE_URL", "sqlite::memory:");
    env::set_var("REDIS_URL", "redis://cache:6379");
    env::set_var("JWT_SECRET", "s3cret");
    env::set_var("COZE_API_URL", "https://api.coze.com/");
    env::set_var("COZE_BOT_ID", "bot-1");
    env::set_var("COZE_PRIVATE_KEY_FILE_PATH", "/etc/coze/key.pem");
    env::set_var("RELAY_HISTORY_WINDOW", "5");
    env::set_var("RELAY_SAVE_PARTIAL_ON_DISCONNECT", "true");

    let config = ServerConfig::from_env().unwrap();
    clear_env();

    assert_eq!(config.http_port, 9090);
    assert_eq!(config.database, DatabaseUrl::Memory);
    assert_eq!(config.cache.redis_url.as_deref(), Some("redis://cache:6379"));
    assert_eq!(config.auth.jwt_secret, "s3cret");
    assert_eq!(config.coze.api_url, "https://api.coze.com");
    assert_eq!(config.coze.bot_id, "bot-1");
    assert_eq!(
        config.coze.private_key_file_path,
        Some(PathBuf::from("/etc/coze/key.pem"))
    );
    assert_eq!(config.relay.history_window, 5);
    assert!(config.relay.save_partial_on_disconnect);
}

#[test]
#[serial]
fn test_unparseable_value_is_rejected() {
    clear_env();
    env::set_var("HTTP_PORT", "not-a-port");
    let result = ServerConfig::from_env();
    clear_env();

    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("HTTP_PORT"));
}

#[test]
#[serial]
fn test_cache_ttl_must_stay_below_token_ttl() {
    clear_env();
    env::set_var("COZE_TOKEN_TTL_SECS", "600");
    env::set_var("COZE_TOKEN_CACHE_TTL_SECS", "600");
    let result = ServerConfig::from_env();
    clear_env();

    assert!(result.is_err());
}

#[test]
#[serial]
fn test_production_requires_session_secret() {
    clear_env();
    env::set_var("ENVIRONMENT", "production");
    let result = ServerConfig::from_env();
    clear_env();

    assert!(result.is_err());
}
