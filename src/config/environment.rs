// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Parses listen address, database, cache, session, upstream, and relay settings
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Environment-based configuration
//!
//! Every setting has a default so the gateway starts with an empty environment.
//! Missing upstream signing material is not a startup error: it surfaces as a
//! configuration error the first time a token is needed.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::{auth, cache, database, network, relay, upstream};

/// Environment type for security and other configurations
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development
    #[default]
    Development,
    /// Production deployment
    Production,
    /// Automated tests
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" | "release" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is a production environment
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// Type-safe database location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseUrl {
    /// `SQLite` database file
    SQLite {
        /// File path
        path: PathBuf,
    },
    /// In-memory `SQLite` (for testing)
    Memory,
}

impl DatabaseUrl {
    /// Parse from string, treating bare paths as `SQLite` files
    #[must_use]
    pub fn parse_url(s: &str) -> Self {
        let path = s.strip_prefix("sqlite://").or_else(|| s.strip_prefix("sqlite:")).unwrap_or(s);
        if path == ":memory:" {
            Self::Memory
        } else {
            Self::SQLite {
                path: PathBuf::from(path),
            }
        }
    }

    /// Convert to a sqlx connection string
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::SQLite { path } => format!("sqlite:{}", path.display()),
            Self::Memory => "sqlite::memory:".to_owned(),
        }
    }

    /// Whether this is a throwaway in-memory database
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl Default for DatabaseUrl {
    fn default() -> Self {
        Self::parse_url(database::DEFAULT_DATABASE_URL)
    }
}

/// Shared cache configuration
#[derive(Debug, Clone, Default)]
pub struct CacheSettings {
    /// Redis connection string; `None` selects the in-process cache
    pub redis_url: Option<String>,
    /// Capacity of the in-process cache
    pub max_entries: usize,
}

/// Session token configuration
#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 signing secret
    pub jwt_secret: String,
    /// Session lifetime in seconds
    pub jwt_expiry_secs: i64,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_expiry_secs", &self.jwt_expiry_secs)
            .finish()
    }
}

/// Upstream agent API configuration
#[derive(Clone)]
pub struct CozeConfig {
    /// API base URL (no trailing slash)
    pub api_url: String,
    /// Bot used for chats
    pub bot_id: String,
    /// Workflow used for workflow runs
    pub workflow_id: String,
    /// OAuth app client id
    pub client_id: String,
    /// Id of the public key registered with the OAuth app
    pub public_key_id: String,
    /// Inline PEM private key
    pub private_key: Option<String>,
    /// Path to a PEM private key file
    pub private_key_file_path: Option<PathBuf>,
    /// Requested access token lifetime
    pub token_ttl: Duration,
    /// How long an access token is cached
    pub token_cache_ttl: Duration,
    /// Ceiling on any single upstream call
    pub request_timeout: Duration,
}

impl fmt::Debug for CozeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CozeConfig")
            .field("api_url", &self.api_url)
            .field("bot_id", &self.bot_id)
            .field("workflow_id", &self.workflow_id)
            .field("client_id", &self.client_id)
            .field("public_key_id", &self.public_key_id)
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .field("private_key_file_path", &self.private_key_file_path)
            .field("token_ttl", &self.token_ttl)
            .field("token_cache_ttl", &self.token_cache_ttl)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for CozeConfig {
    fn default() -> Self {
        Self {
            api_url: upstream::DEFAULT_API_URL.to_owned(),
            bot_id: String::new(),
            workflow_id: String::new(),
            client_id: String::new(),
            public_key_id: String::new(),
            private_key: None,
            private_key_file_path: None,
            token_ttl: Duration::from_secs(upstream::DEFAULT_TOKEN_TTL_SECS),
            token_cache_ttl: Duration::from_secs(upstream::DEFAULT_TOKEN_CACHE_TTL_SECS),
            request_timeout: Duration::from_secs(upstream::DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Stream relay tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// Messages of history sent upstream with each turn
    pub history_window: i64,
    /// Persist the partial assistant reply when the client disconnects
    pub save_partial_on_disconnect: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            history_window: relay::DEFAULT_HISTORY_WINDOW,
            save_partial_on_disconnect: false,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Comma-separated origins, or `*`
    pub allowed_origins: String,
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Deployment environment
    pub environment: Environment,
    /// Bind address
    pub host: String,
    /// HTTP port
    pub http_port: u16,
    /// Relational store location
    pub database: DatabaseUrl,
    /// Shared cache
    pub cache: CacheSettings,
    /// Session tokens
    pub auth: AuthConfig,
    /// Upstream agent API
    pub coze: CozeConfig,
    /// Relay tuning
    pub relay: RelayConfig,
    /// CORS
    pub cors: CorsConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed, or if
    /// production runs without a session secret
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        let environment = Environment::from_str_or_default(&env_var_or("ENVIRONMENT", "development"));

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if environment.is_production() => {
                bail!("JWT_SECRET must be set in production")
            }
            _ => {
                warn!("JWT_SECRET not set, using an ephemeral development secret");
                format!("dev-{}", uuid::Uuid::new_v4())
            }
        };

        let config = Self {
            environment,
            host: env_var_or("HOST", network::DEFAULT_HOST),
            http_port: parse_env("HTTP_PORT", network::DEFAULT_HTTP_PORT)?,
            database: DatabaseUrl::parse_url(&env_var_or(
                "DATABASE_URL",
                database::DEFAULT_DATABASE_URL,
            )),
            cache: CacheSettings {
                redis_url: non_empty_env("REDIS_URL"),
                max_entries: parse_env("CACHE_MAX_ENTRIES", cache::DEFAULT_CACHE_MAX_ENTRIES)?,
            },
            auth: AuthConfig {
                jwt_secret,
                jwt_expiry_secs: parse_env("JWT_EXPIRY_SECS", auth::DEFAULT_JWT_EXPIRY_SECS)?,
            },
            coze: CozeConfig {
                api_url: env_var_or("COZE_API_URL", upstream::DEFAULT_API_URL)
                    .trim_end_matches('/')
                    .to_owned(),
                bot_id: env_var_or("COZE_BOT_ID", ""),
                workflow_id: env_var_or("COZE_WORKFLOW_ID", ""),
                client_id: env_var_or("COZE_CLIENT_ID", ""),
                public_key_id: env_var_or("COZE_PUBLIC_KEY_ID", ""),
                private_key: non_empty_env("COZE_PRIVATE_KEY"),
                private_key_file_path: non_empty_env("COZE_PRIVATE_KEY_FILE_PATH")
                    .map(PathBuf::from),
                token_ttl: Duration::from_secs(parse_env(
                    "COZE_TOKEN_TTL_SECS",
                    upstream::DEFAULT_TOKEN_TTL_SECS,
                )?),
                token_cache_ttl: Duration::from_secs(parse_env(
                    "COZE_TOKEN_CACHE_TTL_SECS",
                    upstream::DEFAULT_TOKEN_CACHE_TTL_SECS,
                )?),
                request_timeout: Duration::from_secs(parse_env(
                    "COZE_REQUEST_TIMEOUT_SECS",
                    upstream::DEFAULT_REQUEST_TIMEOUT_SECS,
                )?),
            },
            relay: RelayConfig {
                history_window: parse_env("RELAY_HISTORY_WINDOW", relay::DEFAULT_HISTORY_WINDOW)?,
                save_partial_on_disconnect: parse_env("RELAY_SAVE_PARTIAL_ON_DISCONNECT", false)?,
            },
            cors: CorsConfig {
                allowed_origins: env_var_or("CORS_ALLOWED_ORIGINS", "*"),
            },
        };

        config.validate()?;
        config.log_summary();
        Ok(config)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns an error if the token cache TTL is not strictly below the token
    /// lifetime or the relay history window is not positive
    pub fn validate(&self) -> Result<()> {
        if self.coze.token_cache_ttl >= self.coze.token_ttl {
            bail!(
                "COZE_TOKEN_CACHE_TTL_SECS ({}) must be less than COZE_TOKEN_TTL_SECS ({})",
                self.coze.token_cache_ttl.as_secs(),
                self.coze.token_ttl.as_secs()
            );
        }
        if self.relay.history_window <= 0 {
            bail!("RELAY_HISTORY_WINDOW must be positive");
        }
        if self.coze.private_key.is_some() && self.coze.private_key_file_path.is_some() {
            warn!("Both COZE_PRIVATE_KEY and COZE_PRIVATE_KEY_FILE_PATH are set; the inline key wins");
        }
        Ok(())
    }

    fn log_summary(&self) {
        info!(
            environment = %self.environment,
            port = self.http_port,
            database = %self.database.to_connection_string(),
            redis = self.cache.redis_url.is_some(),
            coze_api = %self.coze.api_url,
            bot_configured = !self.coze.bot_id.is_empty(),
            signing_key_configured = self.coze.private_key.is_some()
                || self.coze.private_key_file_path.is_some(),
            "Configuration loaded"
        );
    }
}

fn env_var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_owned())
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty_env(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {name} value: {raw}")),
        None => Ok(default),
    }
}
