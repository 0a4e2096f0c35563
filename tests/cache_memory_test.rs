// ABOUTME: Unit tests for the in-memory cache backend
// ABOUTME: Tests TTL expiration, LRU capacity, invalidation, and background cleanup
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use std::time::Duration;

use coze_gateway::cache::{Cache, CacheConfig, CacheKey, CacheProvider};
use coze_gateway::config::environment::CacheSettings;
use coze_gateway::errors::AppResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct TestData {
    value: String,
    count: u32,
}

fn data(value: &str) -> TestData {
    TestData {
        value: value.to_owned(),
        count: 1,
    }
}

/// Helper: Create in-memory cache with custom config
async fn create_test_cache(max_entries: usize, cleanup_interval_secs: u64) -> AppResult<Cache> {
    let config = CacheConfig {
        max_entries,
        cleanup_interval: Duration::from_secs(cleanup_interval_secs),
        enable_background_cleanup: false,
        ..CacheConfig::default()
    };
    Cache::new(config).await
}

#[tokio::test]
async fn test_cache_set_and_get() -> AppResult<()> {
    let cache = create_test_cache(100, 300).await?;
    let key = CacheKey::new("test", "set_get");

    cache.set(&key, &data("test"), Duration::from_secs(10)).await?;

    let retrieved: Option<TestData> = cache.get(&key).await?;
    assert_eq!(retrieved, Some(data("test")));
    Ok(())
}

#[tokio::test]
async fn test_access_token_key_format() {
    assert_eq!(CacheKey::access_token().to_string(), "coze:access_token");
}

#[tokio::test]
async fn test_cache_expiration() -> AppResult<()> {
    let cache = create_test_cache(100, 300).await?;
    let key = CacheKey::new("test", "expires");

    cache.set(&key, &data("expires"), Duration::from_secs(1)).await?;
    assert!(cache.exists(&key).await?);

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let retrieved: Option<TestData> = cache.get(&key).await?;
    assert_eq!(retrieved, None);
    assert!(!cache.exists(&key).await?);
    Ok(())
}

#[tokio::test]
async fn test_cache_ttl() -> AppResult<()> {
    let cache = create_test_cache(100, 300).await?;
    let key = CacheKey::new("test", "ttl");

    cache.set(&key, &data("ttl"), Duration::from_secs(10)).await?;

    let ttl = cache.ttl(&key).await?.expect("live entry has a ttl");
    assert!(ttl.as_secs() <= 10);
    assert!(ttl.as_secs() >= 9);

    assert_eq!(cache.ttl(&CacheKey::new("test", "missing")).await?, None);
    Ok(())
}

#[tokio::test]
async fn test_cache_invalidate() -> AppResult<()> {
    let cache = create_test_cache(100, 300).await?;
    let key = CacheKey::new("test", "delete_me");

    cache.set(&key, &data("delete_me"), Duration::from_secs(60)).await?;
    assert!(cache.exists(&key).await?);

    cache.invalidate(&key).await?;

    assert!(!cache.exists(&key).await?);
    let retrieved: Option<TestData> = cache.get(&key).await?;
    assert_eq!(retrieved, None);
    Ok(())
}

#[tokio::test]
async fn test_cache_overwrite_is_last_writer_wins() -> AppResult<()> {
    let cache = create_test_cache(100, 300).await?;
    let key = CacheKey::access_token();

    cache.set(&key, &data("first"), Duration::from_secs(60)).await?;
    cache.set(&key, &data("second"), Duration::from_secs(60)).await?;

    let retrieved: Option<TestData> = cache.get(&key).await?;
    assert_eq!(retrieved, Some(data("second")));
    Ok(())
}

#[tokio::test]
async fn test_cache_namespaces_are_isolated() -> AppResult<()> {
    let cache = create_test_cache(100, 300).await?;
    let key1 = CacheKey::new("alpha", "shared");
    let key2 = CacheKey::new("beta", "shared");

    cache.set(&key1, &data("alpha"), Duration::from_secs(60)).await?;
    cache.set(&key2, &data("beta"), Duration::from_secs(60)).await?;

    cache.invalidate(&key1).await?;
    assert!(!cache.exists(&key1).await?);
    let retrieved: Option<TestData> = cache.get(&key2).await?;
    assert_eq!(retrieved, Some(data("beta")));
    Ok(())
}

#[tokio::test]
async fn test_cache_capacity_eviction() -> AppResult<()> {
    let cache = create_test_cache(10, 300).await?;

    for i in 0..20 {
        let key = CacheKey::new("capacity", i.to_string());
        cache.set(&key, &data("capacity"), Duration::from_secs(60)).await?;
    }

    let mut count = 0;
    for i in 0..20 {
        if cache.exists(&CacheKey::new("capacity", i.to_string())).await? {
            count += 1;
        }
    }
    assert_eq!(count, 10);

    // The most recently written entries survive
    assert!(cache.exists(&CacheKey::new("capacity", "19")).await?);
    assert!(!cache.exists(&CacheKey::new("capacity", "0")).await?);
    Ok(())
}

#[tokio::test]
async fn test_cache_background_cleanup() -> AppResult<()> {
    let cache = Cache::new(CacheConfig {
        max_entries: 100,
        cleanup_interval: Duration::from_secs(1),
        enable_background_cleanup: true,
        ..CacheConfig::default()
    })
    .await?;

    let keys: Vec<_> = (0..5)
        .map(|i| CacheKey::new("cleanup", i.to_string()))
        .collect();
    for key in &keys {
        cache.set(key, &data("cleanup"), Duration::from_secs(1)).await?;
    }
    for key in &keys {
        assert!(cache.exists(key).await?);
    }

    tokio::time::sleep(Duration::from_millis(2500)).await;

    for key in &keys {
        assert!(!cache.exists(key).await?);
    }
    Ok(())
}

#[tokio::test]
async fn test_cache_health_check() -> AppResult<()> {
    let cache = create_test_cache(100, 300).await?;
    cache.health_check().await?;
    assert_eq!(cache.backend(), "memory");
    Ok(())
}

#[tokio::test]
async fn test_unreachable_redis_falls_back_to_memory() -> AppResult<()> {
    let cache = Cache::from_settings(&CacheSettings {
        redis_url: Some("redis://127.0.0.1:1".to_owned()),
        max_entries: 10,
    })
    .await?;
    assert_eq!(cache.backend(), "memory");
    Ok(())
}
