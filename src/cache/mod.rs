// ABOUTME: Cache abstraction layer for short-lived shared values such as upstream credentials
// ABOUTME: Pluggable backend support (in-memory, Redis) behind one async trait
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Cache factory selecting a backend from configuration
pub mod factory;
/// In-memory cache implementation
pub mod memory;
/// Redis cache implementation
pub mod redis;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::cache::{
    ACCESS_TOKEN_KEY, CREDENTIAL_NAMESPACE, DEFAULT_CACHE_MAX_ENTRIES,
    DEFAULT_CLEANUP_INTERVAL_SECS, REDIS_CONNECT_TIMEOUT_SECS, REDIS_INITIAL_CONNECTION_RETRIES,
    REDIS_INITIAL_RETRY_DELAY_MS, REDIS_MAX_RETRY_DELAY_MS, REDIS_RESPONSE_TIMEOUT_SECS,
};
use crate::errors::AppResult;

pub use factory::Cache;

/// Cache provider trait for pluggable backend implementations
///
/// Values are stored as JSON. Writes are atomic per key and last-writer-wins,
/// which is all the credential cache needs.
///
/// ```rust,no_run
/// use coze_gateway::cache::{CacheConfig, CacheKey, CacheProvider};
/// use coze_gateway::cache::memory::InMemoryCache;
/// use std::time::Duration;
/// # async fn example() -> Result<(), coze_gateway::errors::AppError> {
/// let cache = InMemoryCache::new(CacheConfig {
///     enable_background_cleanup: false,
///     ..Default::default()
/// })
/// .await?;
///
/// let key = CacheKey::access_token();
/// cache.set(&key, &"token", Duration::from_secs(840)).await?;
/// let cached: Option<String> = cache.get(&key).await?;
/// assert_eq!(cached.as_deref(), Some("token"));
/// # Ok(())
/// # }
/// ```
#[async_trait::async_trait]
pub trait CacheProvider: Send + Sync + Clone {
    /// Create new cache instance with configuration
    ///
    /// # Errors
    ///
    /// Returns an error if cache initialization fails
    async fn new(config: CacheConfig) -> AppResult<Self>
    where
        Self: Sized;

    /// Store value in cache with TTL
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or storage fails
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()>;

    /// Retrieve value from cache; expired entries read as `None`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or deserialization fails
    async fn get<T: for<'de> Deserialize<'de>>(&self, key: &CacheKey) -> AppResult<Option<T>>;

    /// Remove single cache entry
    ///
    /// # Errors
    ///
    /// Returns an error if invalidation fails
    async fn invalidate(&self, key: &CacheKey) -> AppResult<()>;

    /// Check if key exists in cache
    ///
    /// # Errors
    ///
    /// Returns an error if existence check fails
    async fn exists(&self, key: &CacheKey) -> AppResult<bool>;

    /// Get remaining TTL for key
    ///
    /// # Errors
    ///
    /// Returns an error if TTL check fails
    async fn ttl(&self, key: &CacheKey) -> AppResult<Option<Duration>>;

    /// Verify cache backend is healthy
    ///
    /// # Errors
    ///
    /// Returns an error if health check fails
    async fn health_check(&self) -> AppResult<()>;
}

/// Redis connection and retry settings
#[derive(Debug, Clone)]
pub struct RedisConnectionConfig {
    /// Connect timeout
    pub connection_timeout_secs: u64,
    /// Per-command response timeout
    pub response_timeout_secs: u64,
    /// Attempts at startup before giving up
    pub initial_connection_retries: u32,
    /// First backoff delay
    pub initial_retry_delay_ms: u64,
    /// Backoff ceiling
    pub max_retry_delay_ms: u64,
}

impl Default for RedisConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout_secs: REDIS_CONNECT_TIMEOUT_SECS,
            response_timeout_secs: REDIS_RESPONSE_TIMEOUT_SECS,
            initial_connection_retries: REDIS_INITIAL_CONNECTION_RETRIES,
            initial_retry_delay_ms: REDIS_INITIAL_RETRY_DELAY_MS,
            max_retry_delay_ms: REDIS_MAX_RETRY_DELAY_MS,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries (for in-memory cache)
    pub max_entries: usize,
    /// Redis connection URL (for Redis cache)
    pub redis_url: Option<String>,
    /// Cleanup interval for expired entries
    pub cleanup_interval: Duration,
    /// Enable background cleanup task (should be false in tests to avoid runtime conflicts)
    pub enable_background_cleanup: bool,
    /// Redis connection and retry configuration
    pub redis_connection: RedisConnectionConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            redis_url: None,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            enable_background_cleanup: true,
            redis_connection: RedisConnectionConfig::default(),
        }
    }
}

/// Namespaced cache key rendered as `namespace:name`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Owning subsystem
    pub namespace: String,
    /// Entry name within the namespace
    pub name: String,
}

impl CacheKey {
    /// Create new cache key
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of the shared upstream access token (`coze:access_token`)
    #[must_use]
    pub fn access_token() -> Self {
        Self::new(CREDENTIAL_NAMESPACE, ACCESS_TOKEN_KEY)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}
