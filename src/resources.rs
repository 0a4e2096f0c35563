// ABOUTME: Shared server resources constructed once at startup and handed to every route
// ABOUTME: Wires database, cache, credential cache, upstream client, and relay by explicit injection
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Server Resources
//!
//! All long-lived collaborators are built here exactly once and shared by
//! `Arc`. There are no process-wide singletons.

use std::sync::Arc;

use crate::auth::AuthManager;
use crate::cache::Cache;
use crate::config::environment::ServerConfig;
use crate::database::Database;
use crate::errors::AppResult;
use crate::relay::{RelayOptions, StreamRelay};
use crate::upstream::coze::CozeClient;
use crate::upstream::credentials::{CredentialCache, JwtTokenIssuer, TokenIssuer};
use crate::upstream::UpstreamApi;

/// Centralized resource container for dependency injection
#[derive(Clone)]
pub struct ServerResources {
    /// Persistence
    pub database: Arc<Database>,
    /// Session tokens and password hashing
    pub auth_manager: Arc<AuthManager>,
    /// Shared key-value cache backend
    pub cache: Cache,
    /// Upstream access token cache
    pub credentials: Arc<CredentialCache>,
    /// Upstream agent API
    pub upstream: Arc<dyn UpstreamApi>,
    /// Turn orchestration
    pub relay: Arc<StreamRelay>,
    /// Effective configuration
    pub config: Arc<ServerConfig>,
}

impl ServerResources {
    /// Assemble resources from already-built collaborators
    #[must_use]
    pub fn new(
        database: Database,
        auth_manager: AuthManager,
        cache: Cache,
        credentials: Arc<CredentialCache>,
        upstream: Arc<dyn UpstreamApi>,
        config: Arc<ServerConfig>,
    ) -> Self {
        let database = Arc::new(database);
        let relay = StreamRelay::new(
            database.clone(),
            upstream.clone(),
            RelayOptions::from_config(&config.relay, &config.coze),
        );

        Self {
            database,
            auth_manager: Arc::new(auth_manager),
            cache,
            credentials,
            upstream,
            relay: Arc::new(relay),
            config,
        }
    }

    /// Build the production resource graph from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the HTTP client cannot be built
    pub async fn from_config(config: ServerConfig) -> AppResult<Self> {
        let config = Arc::new(config);

        let database = Database::connect(&config.database).await?;
        let cache = Cache::from_settings(&config.cache).await?;

        let http = CozeClient::http_client(&config.coze)?;
        let issuer: Arc<dyn TokenIssuer> = Arc::new(JwtTokenIssuer::new(http.clone(), &config.coze));
        let credentials = Arc::new(CredentialCache::new(
            cache.clone(),
            issuer,
            config.coze.token_cache_ttl,
        ));
        let upstream: Arc<dyn UpstreamApi> = Arc::new(CozeClient::new(
            http,
            config.coze.clone(),
            credentials.clone(),
        ));

        Ok(Self::new(
            database,
            AuthManager::new(&config.auth),
            cache,
            credentials,
            upstream,
            config,
        ))
    }
}
