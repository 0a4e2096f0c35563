// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides a scripted upstream, a counting token issuer, and in-memory resources
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used,
    clippy::expect_used
)]
//! Shared test utilities for `coze_gateway`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coze_gateway::auth::AuthManager;
use coze_gateway::cache::Cache;
use coze_gateway::config::environment::{
    AuthConfig, CacheSettings, CorsConfig, CozeConfig, DatabaseUrl, Environment, RelayConfig,
    ServerConfig,
};
use coze_gateway::database::{Database, NewUser};
use coze_gateway::errors::{AppError, AppResult};
use coze_gateway::models::User;
use coze_gateway::resources::ServerResources;
use coze_gateway::upstream::credentials::{CredentialCache, IssuedToken, TokenIssuer};
use coze_gateway::upstream::{
    AssistantReply, ChatStreamRequest, EventSource, StreamEvent, UploadSource, UploadedFile,
    UpstreamApi, Usage, WorkflowInput, WorkflowRunResult,
};
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use tokio::io::AsyncReadExt;

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            Ok("WARN" | "ERROR") | _ => tracing::Level::WARN,
        };

        let _ = tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// Scripted upstream
// ============================================================================

/// How an opened stream behaves
#[derive(Debug, Clone, Default)]
pub struct StreamScript {
    /// Events yielded in order
    pub events: Vec<StreamEvent>,
    /// In-stream error yielded after the events
    pub fail_with: Option<String>,
    /// Keep the stream open after the events instead of ending it
    pub hang: bool,
}

impl StreamScript {
    /// A stream that yields `events` then ends
    pub fn events(events: Vec<StreamEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }
}

/// Upstream double that replays a script and records calls
#[derive(Default)]
pub struct MockUpstream {
    /// Script used by every stream open
    pub script: Mutex<StreamScript>,
    /// Error returned when opening a stream
    pub open_error: Mutex<Option<String>>,
    /// Conversations created so far
    pub conversations_created: AtomicUsize,
    /// Chat stream requests received
    pub chat_requests: Mutex<Vec<ChatStreamRequest>>,
    /// Workflow inputs received
    pub workflow_inputs: Mutex<Vec<WorkflowInput>>,
    /// Uploaded payloads as (name, bytes)
    pub uploads: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockUpstream {
    /// Upstream replaying `script`
    pub fn with_script(script: StreamScript) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            ..Self::default()
        })
    }

    /// Upstream whose stream opens fail with `message`
    pub fn failing_open(message: &str) -> Arc<Self> {
        Arc::new(Self {
            open_error: Mutex::new(Some(message.to_owned())),
            ..Self::default()
        })
    }

    fn open(&self) -> AppResult<EventSource> {
        if let Some(message) = self.open_error.lock().unwrap().clone() {
            return Err(AppError::upstream_unavailable(message));
        }
        let script = self.script.lock().unwrap().clone();

        let events = stream::iter(script.events.into_iter().map(Ok));
        let tail = stream::iter(
            script
                .fail_with
                .map(|message| Err(AppError::external_service("coze", message))),
        );
        let body = events.chain(tail);
        if script.hang {
            Ok(EventSource::new(
                Some("log-test".to_owned()),
                body.chain(stream::pending()),
            ))
        } else {
            Ok(EventSource::new(Some("log-test".to_owned()), body))
        }
    }
}

#[async_trait]
impl UpstreamApi for MockUpstream {
    async fn create_conversation(&self) -> AppResult<String> {
        let n = self.conversations_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("ext-conv-{n}"))
    }

    async fn send_message(
        &self,
        _external_conversation_id: &str,
        _user_id: &str,
        text: &str,
    ) -> AppResult<AssistantReply> {
        Ok(AssistantReply {
            chat_id: "chat-sync".to_owned(),
            content: format!("echo: {text}"),
            usage: Usage {
                input_count: 3,
                output_count: 4,
                token_count: 7,
            },
        })
    }

    async fn open_chat_stream(&self, request: ChatStreamRequest) -> AppResult<EventSource> {
        self.chat_requests.lock().unwrap().push(request);
        self.open()
    }

    async fn open_workflow_stream(&self, input: WorkflowInput) -> AppResult<EventSource> {
        self.workflow_inputs.lock().unwrap().push(input);
        self.open()
    }

    async fn run_workflow(&self, input: WorkflowInput) -> AppResult<WorkflowRunResult> {
        let data = input
            .parameters
            .get("input")
            .cloned()
            .unwrap_or(Value::Null);
        self.workflow_inputs.lock().unwrap().push(input);
        Ok(WorkflowRunResult {
            data,
            debug_url: None,
            usage: None,
        })
    }

    async fn upload(&self, mut source: UploadSource) -> AppResult<UploadedFile> {
        let mut bytes = Vec::new();
        source.reader.read_to_end(&mut bytes).await?;
        let size = bytes.len() as u64;
        self.uploads
            .lock()
            .unwrap()
            .push((source.file_name.clone(), bytes));
        Ok(UploadedFile {
            file_id: "file-1".to_owned(),
            filename: source.file_name,
            size,
        })
    }
}

// ============================================================================
// Token issuer
// ============================================================================

/// Issuer handing out `token-N` and counting calls
#[derive(Default)]
pub struct CountingIssuer {
    /// Number of issuances
    pub issued: AtomicUsize,
    /// Real expiry reported with each token
    pub expires_at: Option<DateTime<Utc>>,
    /// Fail every issuance with a configuration error
    pub fail: bool,
}

impl CountingIssuer {
    /// Issuance count so far
    pub fn count(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenIssuer for CountingIssuer {
    async fn issue(&self) -> AppResult<IssuedToken> {
        if self.fail {
            return Err(AppError::config("private key is not configured"));
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(IssuedToken {
            access_token: format!("token-{n}"),
            expires_at: self.expires_at,
        })
    }
}

// ============================================================================
// Resources
// ============================================================================

/// Configuration suitable for in-process tests
pub fn test_config() -> ServerConfig {
    ServerConfig {
        environment: Environment::Testing,
        host: "127.0.0.1".to_owned(),
        http_port: 0,
        database: DatabaseUrl::Memory,
        cache: CacheSettings {
            redis_url: None,
            max_entries: 100,
        },
        auth: AuthConfig {
            jwt_secret: "test-secret".to_owned(),
            jwt_expiry_secs: 3600,
        },
        coze: CozeConfig {
            request_timeout: Duration::from_secs(5),
            ..CozeConfig::default()
        },
        relay: RelayConfig::default(),
        cors: CorsConfig {
            allowed_origins: "*".to_owned(),
        },
    }
}

/// Fresh in-memory database with the schema applied
pub async fn create_test_database() -> Database {
    init_test_logging();
    Database::connect(&DatabaseUrl::Memory)
        .await
        .expect("in-memory database")
}

/// Resources over an in-memory database, in-memory cache, and `upstream`
pub async fn create_test_resources(upstream: Arc<MockUpstream>) -> Arc<ServerResources> {
    let config = Arc::new(test_config());
    let database = create_test_database().await;
    let cache = Cache::in_memory().await.expect("in-memory cache");
    let credentials = Arc::new(CredentialCache::new(
        cache.clone(),
        Arc::new(CountingIssuer::default()),
        Duration::from_secs(840),
    ));
    let auth_manager = AuthManager::new(&config.auth).with_hash_cost(4);

    Arc::new(ServerResources::new(
        database,
        auth_manager,
        cache,
        credentials,
        upstream,
        config,
    ))
}

/// Insert a user directly and return it with a session token
pub async fn create_test_user(resources: &ServerResources, username: &str) -> (User, String) {
    let password_hash = resources
        .auth_manager
        .hash_password("password123")
        .await
        .expect("hash");
    let user = resources
        .database
        .create_user(&NewUser {
            username: username.to_owned(),
            email: format!("{username}@example.com"),
            password_hash,
            nickname: None,
        })
        .await
        .expect("create user");
    let session = resources.auth_manager.generate_token(&user).expect("token");
    (user, session.token)
}
