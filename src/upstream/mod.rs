// ABOUTME: Upstream agent API abstraction: conversations, chats, workflows, and file uploads
// ABOUTME: Defines the UpstreamApi trait consumed by the relay and its request/response types
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Upstream Client
//!
//! The relay talks to the third-party agent service only through
//! [`UpstreamApi`]. [`coze::CozeClient`] is the production implementation;
//! tests substitute their own.
//!
//! Every call that needs authorization fetches a token from the
//! [`credentials::CredentialCache`] first. Streaming calls return an
//! [`events::EventSource`] of normalized [`events::StreamEvent`]s.

/// Coze HTTP client
pub mod coze;
/// Shared access token cache and JWT-bearer issuer
pub mod credentials;
/// Normalized stream event model
pub mod events;
/// SSE framing
pub mod sse_parser;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::AsyncRead;

pub use events::{EventSource, StreamEvent, StreamEventKind, Usage};

use crate::errors::AppResult;
use crate::models::MessageRole;

/// One prior message sent upstream as context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Author role
    pub role: MessageRole,
    /// Message text
    pub content: String,
}

/// Parameters for opening a streaming chat
#[derive(Debug, Clone)]
pub struct ChatStreamRequest {
    /// Upstream conversation id, used for log correlation only; the
    /// stream itself carries the full history and is not bound to it
    pub external_conversation_id: String,
    /// Caller identity forwarded upstream
    pub user_id: String,
    /// Prior messages, oldest first
    pub history: Vec<HistoryMessage>,
    /// New user message
    pub text: String,
}

/// Reply of a single-shot chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantReply {
    /// Upstream chat id
    pub chat_id: String,
    /// Concatenated answer text
    pub content: String,
    /// Token usage
    pub usage: Usage,
}

/// Input parameters of a workflow run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInput {
    /// Named workflow parameters
    pub parameters: Map<String, Value>,
}

impl WorkflowInput {
    /// Workflow input carrying a single `input` text parameter plus extras
    #[must_use]
    pub fn text(input: impl Into<String>, extra: Map<String, Value>) -> Self {
        let mut parameters = extra;
        parameters.insert("input".to_owned(), Value::String(input.into()));
        Self { parameters }
    }
}

/// Result of a non-streaming workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunResult {
    /// Workflow output, decoded when it is JSON
    pub data: Value,
    /// Upstream debug page
    pub debug_url: Option<String>,
    /// Token usage, when reported
    pub usage: Option<Usage>,
}

/// File to upload
pub struct UploadSource {
    /// Original file name
    pub file_name: String,
    /// Body reader, consumed once
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

/// Uploaded file descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Upstream file id
    pub file_id: String,
    /// File name as stored upstream
    pub filename: String,
    /// Size in bytes
    pub size: u64,
}

/// Operations the gateway needs from the upstream agent service
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// Create an upstream conversation and return its id
    async fn create_conversation(&self) -> AppResult<String>;

    /// Send one message and wait for the complete answer
    async fn send_message(
        &self,
        external_conversation_id: &str,
        user_id: &str,
        text: &str,
    ) -> AppResult<AssistantReply>;

    /// Open a streaming chat turn
    async fn open_chat_stream(&self, request: ChatStreamRequest) -> AppResult<EventSource>;

    /// Open a streaming workflow run
    async fn open_workflow_stream(&self, input: WorkflowInput) -> AppResult<EventSource>;

    /// Run a workflow to completion
    async fn run_workflow(&self, input: WorkflowInput) -> AppResult<WorkflowRunResult>;

    /// Upload a file for later reference in messages
    async fn upload(&self, source: UploadSource) -> AppResult<UploadedFile>;
}
