// ABOUTME: Core domain models for the gateway: users, agents, conversations, and messages
// ABOUTME: Defines the persisted record shapes and the role/status enums stored as text
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Data Models
//!
//! Records are keyed by local integer ids. Conversations and messages also
//! carry the identifier the upstream agent service assigned to them, which is
//! set once and never rewritten.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppError;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instruction message
    System,
    /// User input message
    User,
    /// Assistant response message
    Assistant,
}

impl MessageRole {
    /// Convert to string for database storage and upstream calls
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl Display for MessageRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(AppError::invalid_input(format!(
                "Invalid message role: {other}"
            ))),
        }
    }
}

/// Account status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// May log in
    #[default]
    Active,
    /// Login refused
    Disabled,
}

impl UserStatus {
    /// Convert to string for database storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }
}

impl FromStr for UserStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "disabled" => Ok(Self::Disabled),
            other => Err(AppError::invalid_input(format!(
                "Invalid user status: {other}"
            ))),
        }
    }
}

/// Account role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Regular account
    #[default]
    User,
    /// Administrator
    Admin,
}

impl UserRole {
    /// Convert to string for database storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for UserRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(AppError::invalid_input(format!("Invalid user role: {other}"))),
        }
    }
}

/// Registered account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Local id
    pub id: i64,
    /// Unique login name
    pub username: String,
    /// Unique email address
    pub email: String,
    /// bcrypt hash, never serialized
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    /// Display name
    pub nickname: Option<String>,
    /// Avatar URL
    pub avatar: Option<String>,
    /// Account status
    pub status: UserStatus,
    /// Account role
    pub role: UserRole,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

/// Agent publication status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Not yet usable
    #[default]
    Draft,
    /// Usable
    Published,
    /// Retired
    Archived,
}

impl AgentStatus {
    /// Convert to string for database storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }
}

impl FromStr for AgentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            other => Err(AppError::invalid_input(format!(
                "Invalid agent status: {other}"
            ))),
        }
    }
}

/// User-defined agent description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Local id
    pub id: i64,
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
    /// Avatar URL
    pub avatar: Option<String>,
    /// System prompt
    pub prompt: Option<String>,
    /// Arbitrary JSON configuration
    pub config: Option<Value>,
    /// Publication status
    pub status: AgentStatus,
    /// Owner
    pub user_id: i64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

/// Conversation mirrored from the upstream agent service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Local id
    pub id: i64,
    /// Id assigned by the upstream service
    pub external_conversation_id: String,
    /// Owner
    pub user_id: i64,
    /// Title derived from the first message
    pub title: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last activity time
    pub updated_at: DateTime<Utc>,
}

/// One persisted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Local id, increasing in insertion order
    pub id: i64,
    /// Upstream chat id for assistant messages
    pub external_message_id: Option<String>,
    /// Owning conversation
    pub conversation_id: i64,
    /// Author role
    pub role: MessageRole,
    /// Message text
    pub content: String,
    /// Tokens attributed to this message
    pub token_count: i64,
    /// Creation time
    pub created_at: DateTime<Utc>,
}
