// ABOUTME: Database operations for conversations and their messages
// ABOUTME: Owner-scoped conversation CRUD plus insertion-ordered message history
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{count, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{Conversation, Message, MessageRole};
use crate::pagination::{Page, Paginated};

/// Fields of a new message
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Owning conversation
    pub conversation_id: i64,
    /// Author role
    pub role: MessageRole,
    /// Message text
    pub content: String,
    /// Tokens attributed to this message
    pub token_count: i64,
    /// Upstream chat id, for assistant messages
    pub external_message_id: Option<String>,
}

impl NewMessage {
    /// User message with no token attribution
    #[must_use]
    pub fn user(conversation_id: i64, content: impl Into<String>) -> Self {
        Self {
            conversation_id,
            role: MessageRole::User,
            content: content.into(),
            token_count: 0,
            external_message_id: None,
        }
    }

    /// Assistant message carrying its upstream chat id and usage
    #[must_use]
    pub fn assistant(
        conversation_id: i64,
        content: impl Into<String>,
        token_count: i64,
        external_message_id: Option<String>,
    ) -> Self {
        Self {
            conversation_id,
            role: MessageRole::Assistant,
            content: content.into(),
            token_count,
            external_message_id,
        }
    }
}

const CONVERSATION_COLUMNS: &str =
    "id, external_conversation_id, user_id, title, created_at, updated_at";
const MESSAGE_COLUMNS: &str =
    "id, external_message_id, conversation_id, role, content, token_count, created_at";

fn conversation_from_row(row: &SqliteRow) -> AppResult<Conversation> {
    Ok(Conversation {
        id: row.try_get("id")?,
        external_conversation_id: row.try_get("external_conversation_id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn message_from_row(row: &SqliteRow) -> AppResult<Message> {
    Ok(Message {
        id: row.try_get("id")?,
        external_message_id: row.try_get("external_message_id")?,
        conversation_id: row.try_get("conversation_id")?,
        role: row.try_get::<String, _>("role")?.parse()?,
        content: row.try_get("content")?,
        token_count: row.try_get("token_count")?,
        created_at: row.try_get("created_at")?,
    })
}

impl Database {
    pub(super) async fn migrate_chat(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_conversation_id TEXT NOT NULL,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_message_id TEXT,
                conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
                content TEXT NOT NULL,
                token_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_user_id ON conversations(user_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation_id ON messages(conversation_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========================================================================
    // Conversation Operations
    // ========================================================================

    /// Create a conversation mirroring an upstream one
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn create_conversation(
        &self,
        user_id: i64,
        external_conversation_id: &str,
        title: &str,
    ) -> AppResult<Conversation> {
        let now = Utc::now();
        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO conversations (external_conversation_id, user_id, title, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id
            ",
        )
        .bind(external_conversation_id)
        .bind(user_id)
        .bind(title)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create conversation: {e}")))?;

        Ok(Conversation {
            id,
            external_conversation_id: external_conversation_id.to_owned(),
            user_id,
            title: title.to_owned(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a conversation owned by `user_id`
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn get_conversation(
        &self,
        conversation_id: i64,
        user_id: i64,
    ) -> AppResult<Option<Conversation>> {
        let row = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1 AND user_id = $2"
        ))
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get conversation: {e}")))?;

        row.as_ref().map(conversation_from_row).transpose()
    }

    /// List conversations owned by `user_id`, most recently active first
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn list_conversations(
        &self,
        user_id: i64,
        page: Page,
    ) -> AppResult<Paginated<Conversation>> {
        let total = count(
            &self.pool,
            "SELECT COUNT(*) FROM conversations WHERE user_id = $1",
            user_id,
        )
        .await?;

        let rows = sqlx::query(&format!(
            r"
            SELECT {CONVERSATION_COLUMNS} FROM conversations
            WHERE user_id = $1
            ORDER BY updated_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list conversations: {e}")))?;

        let items = rows
            .iter()
            .map(conversation_from_row)
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Paginated::new(items, total, page))
    }

    /// Delete a conversation and all its messages (cascade)
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn delete_conversation(&self, conversation_id: i64, user_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1 AND user_id = $2")
            .bind(conversation_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete conversation: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Message Operations
    // ========================================================================

    /// Append a message and bump the conversation's activity time
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn add_message(&self, message: &NewMessage) -> AppResult<Message> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO messages (external_message_id, conversation_id, role, content, token_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            ",
        )
        .bind(&message.external_message_id)
        .bind(message.conversation_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.token_count)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::database(format!("Failed to add message: {e}")))?;

        sqlx::query("UPDATE conversations SET updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(message.conversation_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::database(format!("Failed to update conversation timestamp: {e}"))
            })?;

        tx.commit().await?;

        Ok(Message {
            id,
            external_message_id: message.external_message_id.clone(),
            conversation_id: message.conversation_id,
            role: message.role,
            content: message.content.clone(),
            token_count: message.token_count,
            created_at: now,
        })
    }

    /// Page through a conversation's messages in insertion order
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn list_messages(
        &self,
        conversation_id: i64,
        page: Page,
    ) -> AppResult<Paginated<Message>> {
        let total = count(
            &self.pool,
            "SELECT COUNT(*) FROM messages WHERE conversation_id = $1",
            conversation_id,
        )
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = $1 ORDER BY id ASC LIMIT $2 OFFSET $3"
        ))
        .bind(conversation_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list messages: {e}")))?;

        let items = rows.iter().map(message_from_row).collect::<AppResult<Vec<_>>>()?;
        Ok(Paginated::new(items, total, page))
    }

    /// Get the last `limit` messages, oldest first (for the context window)
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn recent_messages(&self, conversation_id: i64, limit: i64) -> AppResult<Vec<Message>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {MESSAGE_COLUMNS} FROM (
                SELECT {MESSAGE_COLUMNS} FROM messages
                WHERE conversation_id = $1
                ORDER BY id DESC
                LIMIT $2
            ) ORDER BY id ASC
            "
        ))
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get recent messages: {e}")))?;

        rows.iter().map(message_from_row).collect()
    }
}
