// ABOUTME: Narrow persistence contract the relay uses to resolve conversations and write messages
// ABOUTME: Implemented for the SQLite Database; tests substitute failing or recording stores
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use async_trait::async_trait;

use crate::database::{Database, NewMessage};
use crate::errors::AppResult;
use crate::models::{Conversation, Message};

/// Conversation and message operations needed by the relay
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist a new conversation
    async fn create_conversation(
        &self,
        user_id: i64,
        external_conversation_id: &str,
        title: &str,
    ) -> AppResult<Conversation>;

    /// Load a conversation if `user_id` owns it
    async fn get_conversation(
        &self,
        conversation_id: i64,
        user_id: i64,
    ) -> AppResult<Option<Conversation>>;

    /// Last `limit` messages, oldest first
    async fn recent_messages(&self, conversation_id: i64, limit: i64) -> AppResult<Vec<Message>>;

    /// Append a message
    async fn add_message(&self, message: &NewMessage) -> AppResult<Message>;
}

#[async_trait]
impl ConversationStore for Database {
    async fn create_conversation(
        &self,
        user_id: i64,
        external_conversation_id: &str,
        title: &str,
    ) -> AppResult<Conversation> {
        Self::create_conversation(self, user_id, external_conversation_id, title).await
    }

    async fn get_conversation(
        &self,
        conversation_id: i64,
        user_id: i64,
    ) -> AppResult<Option<Conversation>> {
        Self::get_conversation(self, conversation_id, user_id).await
    }

    async fn recent_messages(&self, conversation_id: i64, limit: i64) -> AppResult<Vec<Message>> {
        Self::recent_messages(self, conversation_id, limit).await
    }

    async fn add_message(&self, message: &NewMessage) -> AppResult<Message> {
        Self::add_message(self, message).await
    }
}
