// ABOUTME: Shared upstream access token cache with JWT-bearer issuance on miss or expiry
// ABOUTME: Signs RS256 assertions with the configured private key and caches tokens below their real lifetime
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Credential Cache
//!
//! [`CredentialCache::ensure_token`] returns the shared upstream access token:
//!
//! 1. a live [`Credential`] under `coze:access_token` is returned as is
//! 2. otherwise a new token is issued synchronously by the [`TokenIssuer`]
//! 3. the new credential is cached with a TTL strictly below the token's real
//!    lifetime; a failed cache write is logged and the token still returned
//!
//! Issuance failures are returned to the caller without retry. Within one
//! process concurrent misses are collapsed into a single issuance; across
//! processes the shared cache is last-writer-wins, which is harmless because
//! tokens are interchangeable while valid.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::cache::{Cache, CacheKey, CacheProvider};
use crate::config::environment::CozeConfig;
use crate::constants::upstream::{
    paths, JWT_ASSERTION_TTL_SECS, JWT_BEARER_GRANT_TYPE, SERVICE_NAME, TOKEN_SAFETY_MARGIN_SECS,
};
use crate::errors::{AppError, AppResult};

/// Cached access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token for upstream calls
    pub token: String,
    /// When the token was issued
    pub issued_at: DateTime<Utc>,
    /// How long the token may be served from cache
    pub ttl_secs: u64,
}

impl Credential {
    /// Instant after which the cache must not serve this credential
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + chrono::Duration::seconds(self.ttl_secs as i64)
    }

    /// Whether the credential may still be served at `now`
    #[must_use]
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }
}

/// Freshly issued token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Bearer token
    pub access_token: String,
    /// Real expiry reported by the issuer, when known
    pub expires_at: Option<DateTime<Utc>>,
}

/// Source of new access tokens
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Issue a new access token
    ///
    /// # Errors
    ///
    /// Returns a configuration error for missing or invalid signing material,
    /// or an upstream error when the issuer is unreachable or refuses
    async fn issue(&self) -> AppResult<IssuedToken>;
}

/// Process-wide access token cache
pub struct CredentialCache<C: CacheProvider = Cache> {
    cache: C,
    issuer: Arc<dyn TokenIssuer>,
    cache_ttl: Duration,
    issue_lock: Mutex<()>,
}

impl<C: CacheProvider> CredentialCache<C> {
    /// Create a cache serving tokens for at most `cache_ttl`
    #[must_use]
    pub fn new(cache: C, issuer: Arc<dyn TokenIssuer>, cache_ttl: Duration) -> Self {
        Self {
            cache,
            issuer,
            cache_ttl,
            issue_lock: Mutex::new(()),
        }
    }

    /// Return a valid access token, issuing one on miss or expiry
    ///
    /// # Errors
    ///
    /// Returns the issuer's error when a new token is needed and cannot be issued
    pub async fn ensure_token(&self) -> AppResult<String> {
        if let Some(credential) = self.cached().await {
            return Ok(credential.token);
        }

        let _issuing = self.issue_lock.lock().await;
        // Another caller may have issued while this one waited
        if let Some(credential) = self.cached().await {
            return Ok(credential.token);
        }

        let issued = self.issuer.issue().await?;
        let now = Utc::now();
        let ttl = self.ttl_for(&issued, now);
        let credential = Credential {
            token: issued.access_token,
            issued_at: now,
            ttl_secs: ttl.as_secs(),
        };

        if ttl.is_zero() {
            warn!("Issued access token expires within the safety margin, not caching it");
        } else if let Err(e) = self
            .cache
            .set(&CacheKey::access_token(), &credential, ttl)
            .await
        {
            warn!("Failed to cache upstream access token: {e}");
        } else {
            info!(ttl_secs = ttl.as_secs(), "Cached new upstream access token");
        }

        Ok(credential.token)
    }

    /// Drop the cached token so the next call issues a new one
    ///
    /// # Errors
    ///
    /// Returns an error if the cache backend fails
    pub async fn invalidate(&self) -> AppResult<()> {
        self.cache.invalidate(&CacheKey::access_token()).await
    }

    async fn cached(&self) -> Option<Credential> {
        let cached: AppResult<Option<Credential>> =
            self.cache.get(&CacheKey::access_token()).await;
        match cached {
            Ok(Some(credential)) if credential.is_live_at(Utc::now()) => Some(credential),
            Ok(Some(_)) => {
                debug!("Cached access token past its TTL");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Credential cache unavailable, issuing directly: {e}");
                None
            }
        }
    }

    /// Configured TTL, shortened so the cache never outlives the real token
    fn ttl_for(&self, issued: &IssuedToken, now: DateTime<Utc>) -> Duration {
        issued.expires_at.map_or(self.cache_ttl, |expires_at| {
            let remaining = (expires_at - now).num_seconds() - TOKEN_SAFETY_MARGIN_SECS as i64;
            self.cache_ttl
                .min(Duration::from_secs(remaining.max(0) as u64))
        })
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
    jti: String,
}

#[derive(Debug, Serialize)]
struct TokenRequest {
    grant_type: &'static str,
    duration_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Unix timestamp of expiry
    expires_in: Option<i64>,
}

/// Issues access tokens through the upstream JWT-bearer OAuth flow
pub struct JwtTokenIssuer {
    http: reqwest::Client,
    api_url: String,
    client_id: String,
    public_key_id: String,
    private_key: Option<String>,
    private_key_file_path: Option<PathBuf>,
    token_ttl: Duration,
}

impl JwtTokenIssuer {
    /// Create an issuer from upstream configuration
    ///
    /// Signing material is only checked when a token is issued.
    #[must_use]
    pub fn new(http: reqwest::Client, config: &CozeConfig) -> Self {
        Self {
            http,
            api_url: config.api_url.clone(),
            client_id: config.client_id.clone(),
            public_key_id: config.public_key_id.clone(),
            private_key: config.private_key.clone(),
            private_key_file_path: config.private_key_file_path.clone(),
            token_ttl: config.token_ttl,
        }
    }

    /// Load the PEM private key, preferring the inline value
    async fn signing_key(&self) -> AppResult<EncodingKey> {
        let pem = match (&self.private_key, &self.private_key_file_path) {
            // Keys pasted into env files often carry escaped newlines
            (Some(inline), _) => inline.replace("\\n", "\n"),
            (None, Some(path)) => tokio::fs::read_to_string(path).await.map_err(|e| {
                AppError::config(format!(
                    "Cannot read private key file {}: {e}",
                    path.display()
                ))
            })?,
            (None, None) => {
                return Err(AppError::config(
                    "Neither COZE_PRIVATE_KEY nor COZE_PRIVATE_KEY_FILE_PATH is configured",
                ))
            }
        };

        EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AppError::config(format!("Invalid RSA private key: {e}")))
    }

    /// Build the signed assertion exchanged for an access token
    ///
    /// # Errors
    ///
    /// Returns a configuration error when identifiers or key material are missing or invalid
    pub async fn sign_assertion(&self) -> AppResult<String> {
        if self.client_id.is_empty() || self.public_key_id.is_empty() {
            return Err(AppError::config(
                "COZE_CLIENT_ID and COZE_PUBLIC_KEY_ID must be configured",
            ));
        }
        let key = self.signing_key().await?;
        let audience = Url::parse(&self.api_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_owned))
            .ok_or_else(|| AppError::config(format!("Invalid COZE_API_URL: {}", self.api_url)))?;

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.public_key_id.clone());
        header.typ = Some("JWT".to_owned());

        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.client_id,
            aud: &audience,
            iat: now,
            exp: now + JWT_ASSERTION_TTL_SECS,
            jti: Uuid::new_v4().to_string(),
        };

        jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| AppError::config(format!("Failed to sign token assertion: {e}")))
    }
}

#[async_trait]
impl TokenIssuer for JwtTokenIssuer {
    async fn issue(&self) -> AppResult<IssuedToken> {
        let assertion = self.sign_assertion().await?;
        let url = format!("{}{}", self.api_url, paths::OAUTH_TOKEN);

        let response = self
            .http
            .post(&url)
            .bearer_auth(assertion)
            .json(&TokenRequest {
                grant_type: JWT_BEARER_GRANT_TYPE,
                duration_seconds: self.token_ttl.as_secs(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::external_service(
                SERVICE_NAME,
                format!("token issuance failed with {status}: {body}"),
            ));
        }

        let token: TokenResponse = response.json().await?;
        info!("Issued new upstream access token");
        Ok(IssuedToken {
            access_token: token.access_token,
            expires_at: token
                .expires_in
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        })
    }
}
