// ABOUTME: In-memory cache implementation with LRU eviction and TTL support
// ABOUTME: Process-local fallback when no shared Redis instance is configured
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use super::{CacheConfig, CacheKey, CacheProvider};
use crate::errors::AppResult;

type Store = Arc<Mutex<LruCache<String, Entry>>>;

#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory cache with LRU eviction and background cleanup
///
/// Only visible to the current process, so every replica issues its own
/// upstream token when this backend is active. The cleanup task exits once
/// every clone is dropped and its shutdown channel closes.
#[derive(Clone)]
pub struct InMemoryCache {
    store: Store,
    _shutdown_tx: Option<Arc<mpsc::Sender<()>>>,
}

impl InMemoryCache {
    const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1_000) {
        Some(n) => n,
        None => unreachable!(),
    };

    fn with_config(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(Self::DEFAULT_CAPACITY);
        let store: Store = Arc::new(Mutex::new(LruCache::new(capacity)));

        let shutdown_tx = config.enable_background_cleanup.then(|| {
            let (tx, mut rx) = mpsc::channel::<()>(1);
            let store = Arc::clone(&store);
            let every = config.cleanup_interval;

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(every);
                loop {
                    tokio::select! {
                        _ = interval.tick() => Self::purge_expired(&store).await,
                        _ = rx.recv() => {
                            debug!("In-memory cache cleanup task stopping");
                            break;
                        }
                    }
                }
            });

            Arc::new(tx)
        });

        Self {
            store,
            _shutdown_tx: shutdown_tx,
        }
    }

    async fn purge_expired(store: &Store) {
        let now = Instant::now();
        let mut guard = store.lock().await;
        let expired: Vec<String> = guard
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            guard.pop(key);
        }
        drop(guard);

        if !expired.is_empty() {
            debug!(removed = expired.len(), "Purged expired cache entries");
        }
    }

    /// Read a live entry, evicting it first if it has expired
    async fn live_entry(&self, key: &CacheKey) -> Option<Entry> {
        let key = key.to_string();
        let mut guard = self.store.lock().await;
        let expired = match guard.get(&key) {
            Some(entry) if !entry.is_expired(Instant::now()) => return Some(entry.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            guard.pop(&key);
        }
        None
    }
}

#[async_trait::async_trait]
impl CacheProvider for InMemoryCache {
    async fn new(config: CacheConfig) -> AppResult<Self> {
        Ok(Self::with_config(&config))
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()> {
        let entry = Entry {
            data: serde_json::to_vec(value)?,
            expires_at: Instant::now() + ttl,
        };
        self.store.lock().await.push(key.to_string(), entry);
        Ok(())
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, key: &CacheKey) -> AppResult<Option<T>> {
        match self.live_entry(key).await {
            Some(entry) => Ok(Some(serde_json::from_slice(&entry.data)?)),
            None => Ok(None),
        }
    }

    async fn invalidate(&self, key: &CacheKey) -> AppResult<()> {
        self.store.lock().await.pop(&key.to_string());
        Ok(())
    }

    async fn exists(&self, key: &CacheKey) -> AppResult<bool> {
        Ok(self.live_entry(key).await.is_some())
    }

    async fn ttl(&self, key: &CacheKey) -> AppResult<Option<Duration>> {
        Ok(self
            .live_entry(key)
            .await
            .and_then(|entry| entry.expires_at.checked_duration_since(Instant::now())))
    }

    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }
}
