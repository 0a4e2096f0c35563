// ABOUTME: Cache factory for configuration-based backend selection
// ABOUTME: Prefers Redis when configured and falls back to the in-memory cache when unreachable
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::memory::InMemoryCache;
use super::redis::RedisCache;
use super::{CacheConfig, CacheKey, CacheProvider};
use crate::config::environment::CacheSettings;
use crate::errors::AppResult;

/// Unified cache handle over the configured backend
#[derive(Clone)]
pub enum Cache {
    /// Process-local LRU cache
    Memory(InMemoryCache),
    /// Shared Redis cache
    Redis(RedisCache),
}

impl Cache {
    /// Create cache from application settings
    ///
    /// An unreachable Redis is not fatal: the gateway logs a warning and keeps
    /// running on the in-memory backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory backend cannot be created
    pub async fn from_settings(settings: &CacheSettings) -> AppResult<Self> {
        let config = CacheConfig {
            max_entries: settings.max_entries,
            redis_url: settings.redis_url.clone(),
            ..CacheConfig::default()
        };

        if config.redis_url.is_some() {
            match RedisCache::new(config.clone()).await {
                Ok(redis) => return Ok(Self::Redis(redis)),
                Err(e) => warn!("Redis unavailable, falling back to in-memory cache: {e}"),
            }
        }

        info!(
            "Initializing in-memory cache (max entries: {})",
            config.max_entries
        );
        Ok(Self::Memory(InMemoryCache::new(config).await?))
    }

    /// In-memory cache without a cleanup task, for tests and tools
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory backend cannot be created
    pub async fn in_memory() -> AppResult<Self> {
        let config = CacheConfig {
            enable_background_cleanup: false,
            ..CacheConfig::default()
        };
        Ok(Self::Memory(InMemoryCache::new(config).await?))
    }

    /// Backend name for health reporting
    #[must_use]
    pub const fn backend(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Redis(_) => "redis",
        }
    }
}

#[async_trait::async_trait]
impl CacheProvider for Cache {
    async fn new(config: CacheConfig) -> AppResult<Self> {
        if config.redis_url.is_some() {
            Ok(Self::Redis(RedisCache::new(config).await?))
        } else {
            Ok(Self::Memory(InMemoryCache::new(config).await?))
        }
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()> {
        match self {
            Self::Memory(cache) => cache.set(key, value, ttl).await,
            Self::Redis(cache) => cache.set(key, value, ttl).await,
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, key: &CacheKey) -> AppResult<Option<T>> {
        match self {
            Self::Memory(cache) => cache.get(key).await,
            Self::Redis(cache) => cache.get(key).await,
        }
    }

    async fn invalidate(&self, key: &CacheKey) -> AppResult<()> {
        match self {
            Self::Memory(cache) => cache.invalidate(key).await,
            Self::Redis(cache) => cache.invalidate(key).await,
        }
    }

    async fn exists(&self, key: &CacheKey) -> AppResult<bool> {
        match self {
            Self::Memory(cache) => cache.exists(key).await,
            Self::Redis(cache) => cache.exists(key).await,
        }
    }

    async fn ttl(&self, key: &CacheKey) -> AppResult<Option<Duration>> {
        match self {
            Self::Memory(cache) => cache.ttl(key).await,
            Self::Redis(cache) => cache.ttl(key).await,
        }
    }

    async fn health_check(&self) -> AppResult<()> {
        match self {
            Self::Memory(cache) => cache.health_check().await,
            Self::Redis(cache) => cache.health_check().await,
        }
    }
}
