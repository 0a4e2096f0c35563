// ABOUTME: Upstream agent API constants: endpoints, event names, and token lifetimes
// ABOUTME: Wire-level names the client maps into the internal stream event model
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Service name used in logs and error messages
pub const SERVICE_NAME: &str = "coze";

/// Default upstream API base URL
pub const DEFAULT_API_URL: &str = "https://api.coze.cn";

/// Requested access token lifetime (15 minutes)
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 900;

/// Shared cache TTL of the access token (14 minutes)
pub const DEFAULT_TOKEN_CACHE_TTL_SECS: u64 = 840;

/// Margin subtracted from the real token lifetime before caching
pub const TOKEN_SAFETY_MARGIN_SECS: u64 = 60;

/// Lifetime of the signed JWT assertion exchanged for an access token
pub const JWT_ASSERTION_TTL_SECS: i64 = 600;

/// OAuth grant type for JWT bearer assertions
pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Upper bound on a single upstream call, streaming included
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Delay between polls of a non-streaming chat
pub const CHAT_POLL_INTERVAL_MS: u64 = 500;

/// Largest unterminated SSE line or pending frame payload accepted (1 MiB)
pub const MAX_SSE_FRAME_BYTES: usize = 1024 * 1024;

/// Response header carrying the upstream log id
pub const LOG_ID_HEADER: &str = "x-tt-logid";

/// Upstream endpoint paths
pub mod paths {
    /// Access token exchange
    pub const OAUTH_TOKEN: &str = "/api/permission/oauth2/token";
    /// Conversation creation
    pub const CONVERSATION_CREATE: &str = "/v1/conversation/create";
    /// Chat (streaming and non-streaming)
    pub const CHAT: &str = "/v3/chat";
    /// Chat status polling
    pub const CHAT_RETRIEVE: &str = "/v3/chat/retrieve";
    /// Messages of a finished chat
    pub const CHAT_MESSAGE_LIST: &str = "/v3/chat/message/list";
    /// Streaming workflow execution
    pub const WORKFLOW_STREAM_RUN: &str = "/v1/workflow/stream_run";
    /// Non-streaming workflow execution
    pub const WORKFLOW_RUN: &str = "/v1/workflow/run";
    /// File upload
    pub const FILE_UPLOAD: &str = "/v1/files/upload";
}

/// Chat stream event names
pub mod chat_events {
    /// Chat object created
    pub const CHAT_CREATED: &str = "conversation.chat.created";
    /// Incremental message content
    pub const MESSAGE_DELTA: &str = "conversation.message.delta";
    /// Full message available
    pub const MESSAGE_COMPLETED: &str = "conversation.message.completed";
    /// Chat finished with usage
    pub const CHAT_COMPLETED: &str = "conversation.chat.completed";
    /// Chat failed
    pub const CHAT_FAILED: &str = "conversation.chat.failed";
    /// Chat paused waiting for tool output
    pub const CHAT_REQUIRES_ACTION: &str = "conversation.chat.requires_action";
    /// In-stream error
    pub const ERROR: &str = "error";
    /// End of stream
    pub const DONE: &str = "done";
}

/// Workflow stream event names
pub mod workflow_events {
    /// Node output
    pub const MESSAGE: &str = "Message";
    /// Workflow error
    pub const ERROR: &str = "Error";
    /// Workflow finished
    pub const DONE: &str = "Done";
    /// Workflow paused for input
    pub const INTERRUPT: &str = "Interrupt";
    /// Keep-alive
    pub const PING: &str = "PING";
}

/// Chat statuses reported by the retrieve endpoint
pub mod chat_status {
    /// Finished successfully
    pub const COMPLETED: &str = "completed";
    /// Finished with error
    pub const FAILED: &str = "failed";
    /// Waiting for tool output
    pub const REQUIRES_ACTION: &str = "requires_action";
    /// Cancelled upstream
    pub const CANCELED: &str = "canceled";
}
