// ABOUTME: Redis cache implementation with connection management and TTL support
// ABOUTME: Shares upstream credentials across every gateway replica
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::time::Duration;

use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::{CacheConfig, CacheKey, CacheProvider, RedisConnectionConfig};
use crate::errors::{AppError, AppResult};

/// Redis cache implementation
///
/// Keys are written verbatim (`coze:access_token`) so other services reading
/// the same Redis see the same credential.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

fn cache_error(op: &str, e: &redis::RedisError) -> AppError {
    error!("Redis {op} failed: {e}");
    AppError::internal(format!("Cache error during {op}: {e}"))
}

impl RedisCache {
    async fn with_config(config: &CacheConfig) -> AppResult<Self> {
        let redis_url = config
            .redis_url
            .as_deref()
            .ok_or_else(|| AppError::config("Redis URL is required for Redis cache backend"))?;

        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::config(format!("Invalid Redis URL: {e}")))?;
        let manager = Self::connect_with_retry(&client, &config.redis_connection).await?;

        info!("Connected to Redis cache");
        Ok(Self { manager })
    }

    /// Connect with exponential backoff between attempts
    async fn connect_with_retry(
        client: &redis::Client,
        conn_config: &RedisConnectionConfig,
    ) -> AppResult<ConnectionManager> {
        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(Duration::from_secs(conn_config.connection_timeout_secs))
            .set_response_timeout(Duration::from_secs(conn_config.response_timeout_secs));

        let attempts = conn_config.initial_connection_retries + 1;
        let mut delay_ms = conn_config.initial_retry_delay_ms;
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=attempts {
            match ConnectionManager::new_with_config(client.clone(), manager_config.clone()).await
            {
                Ok(manager) => return Ok(manager),
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < attempts {
                        warn!(
                            "Redis connection attempt {attempt}/{attempts} failed, retrying in {delay_ms}ms: {e}"
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        delay_ms = (delay_ms * 2).min(conn_config.max_retry_delay_ms);
                    }
                }
            }
        }

        Err(AppError::upstream_unavailable(format!(
            "Failed to connect to Redis after {attempts} attempts: {last_error}"
        )))
    }
}

#[async_trait::async_trait]
impl CacheProvider for RedisCache {
    async fn new(config: CacheConfig) -> AppResult<Self> {
        Self::with_config(&config).await
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()> {
        let payload = serde_json::to_vec(value)?;
        let mut conn = self.manager.clone();
        // SETEX rejects zero; anything under a second is stored for one
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key.to_string(), payload, ttl_secs)
            .await
            .map_err(|e| cache_error("SETEX", &e))
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, key: &CacheKey) -> AppResult<Option<T>> {
        let mut conn = self.manager.clone();
        let data: Option<Vec<u8>> = conn
            .get(key.to_string())
            .await
            .map_err(|e| cache_error("GET", &e))?;
        data.map(|bytes| serde_json::from_slice(&bytes))
            .transpose()
            .map_err(AppError::from)
    }

    async fn invalidate(&self, key: &CacheKey) -> AppResult<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key.to_string())
            .await
            .map_err(|e| cache_error("DEL", &e))
    }

    async fn exists(&self, key: &CacheKey) -> AppResult<bool> {
        let mut conn = self.manager.clone();
        conn.exists(key.to_string())
            .await
            .map_err(|e| cache_error("EXISTS", &e))
    }

    async fn ttl(&self, key: &CacheKey) -> AppResult<Option<Duration>> {
        let mut conn = self.manager.clone();
        let secs: i64 = conn
            .ttl(key.to_string())
            .await
            .map_err(|e| cache_error("TTL", &e))?;
        // -2 missing key, -1 no expiry
        Ok((secs > 0).then(|| Duration::from_secs(secs as u64)))
    }

    async fn health_check(&self) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| cache_error("PING", &e))?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(AppError::internal(format!(
                "Unexpected Redis PING response '{pong}'"
            )))
        }
    }
}
