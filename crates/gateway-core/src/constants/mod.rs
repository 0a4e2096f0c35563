// ABOUTME: Constants module with domain-separated organization
// ABOUTME: Pure data constants for cache, upstream, relay, and HTTP defaults
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Constants module
//!
//! Constants are grouped into logical domains rather than being in a single large file.

/// Cache-related constants (keys, capacity, cleanup)
pub mod cache;
/// Upstream agent API constants (paths, event names, token lifetimes)
pub mod upstream;

/// Stream relay defaults
pub mod relay {
    /// Number of most recent messages sent upstream as history
    pub const DEFAULT_HISTORY_WINDOW: i64 = 20;
    /// Bounded channel capacity between relay task and SSE response
    pub const DOWNSTREAM_CHANNEL_CAPACITY: usize = 64;
    /// Maximum characters kept from the first line when titling a conversation
    pub const TITLE_MAX_CHARS: usize = 100;
    /// Title used when the first message has no usable first line
    pub const DEFAULT_TITLE: &str = "New conversation";
}

/// Downstream SSE event type names
pub mod events {
    /// Relay accepted the turn
    pub const START: &str = "start";
    /// Incremental assistant text
    pub const MESSAGE_DELTA: &str = "message_delta";
    /// Upstream chat completed with usage
    pub const CHAT_COMPLETED: &str = "chat_completed";
    /// Upstream chat failed
    pub const CHAT_FAILED: &str = "chat_failed";
    /// Upstream requires client action
    pub const REQUIRES_ACTION: &str = "requires_action";
    /// Unrecognized upstream event passed through
    pub const OTHER_EVENT: &str = "other_event";
    /// Relay or upstream error
    pub const ERROR: &str = "error";
    /// Terminal event
    pub const END: &str = "end";
}

/// Network defaults
pub mod network {
    /// Default HTTP port
    pub const DEFAULT_HTTP_PORT: u16 = 8080;
    /// Default bind address
    pub const DEFAULT_HOST: &str = "0.0.0.0";
    /// Maximum accepted upload body (20 MiB)
    pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
}

/// Session token defaults
pub mod auth {
    /// Session JWT lifetime in seconds
    pub const DEFAULT_JWT_EXPIRY_SECS: i64 = 7_200;
    /// Minimum password length accepted at registration
    pub const MIN_PASSWORD_LEN: usize = 6;
}

/// Database defaults
pub mod database {
    /// Default `SQLite` location
    pub const DEFAULT_DATABASE_URL: &str = "sqlite:./data/coze_gateway.db";
}

/// Pagination limits
pub mod pagination {
    /// First page number
    pub const DEFAULT_PAGE: u32 = 1;
    /// Page size when none is supplied
    pub const DEFAULT_PAGE_SIZE: u32 = 10;
    /// Largest allowed page size
    pub const MAX_PAGE_SIZE: u32 = 100;
}
