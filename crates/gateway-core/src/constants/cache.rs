// ABOUTME: Cache-related constants for keys, capacity, and cleanup intervals
// ABOUTME: Shared by the in-memory and Redis cache backends
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Default maximum cache entries for in-memory cache
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1_000;

/// Default cleanup interval in seconds for expired entries
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Namespace of upstream credentials in the shared cache
pub const CREDENTIAL_NAMESPACE: &str = "coze";

/// Name of the shared access token under [`CREDENTIAL_NAMESPACE`]
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Redis connection timeout in seconds
pub const REDIS_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Redis response timeout in seconds
pub const REDIS_RESPONSE_TIMEOUT_SECS: u64 = 3;

/// Attempts made to reach Redis at startup before falling back
pub const REDIS_INITIAL_CONNECTION_RETRIES: u32 = 2;

/// First backoff delay between Redis connection attempts
pub const REDIS_INITIAL_RETRY_DELAY_MS: u64 = 250;

/// Backoff ceiling between Redis connection attempts
pub const REDIS_MAX_RETRY_DELAY_MS: u64 = 2_000;
