// ABOUTME: Agent database operations scoped to the owning user
// ABOUTME: Create, read, paginated list, partial update, and delete of agent records
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{count, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{Agent, AgentStatus};
use crate::pagination::{Page, Paginated};

/// Fields of a new agent
#[derive(Debug, Clone)]
pub struct NewAgent {
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
    /// Avatar URL
    pub avatar: Option<String>,
    /// System prompt
    pub prompt: Option<String>,
    /// JSON configuration
    pub config: Option<Value>,
    /// Initial status
    pub status: AgentStatus,
}

/// Partial agent update; `None` leaves the column unchanged
#[derive(Debug, Clone, Default)]
pub struct AgentUpdate {
    /// Display name
    pub name: Option<String>,
    /// Free-form description
    pub description: Option<String>,
    /// Avatar URL
    pub avatar: Option<String>,
    /// System prompt
    pub prompt: Option<String>,
    /// JSON configuration
    pub config: Option<Value>,
    /// Status
    pub status: Option<AgentStatus>,
}

const AGENT_COLUMNS: &str =
    "id, name, description, avatar, prompt, config, status, user_id, created_at, updated_at";

fn agent_from_row(row: &SqliteRow) -> AppResult<Agent> {
    let config = row
        .try_get::<Option<String>, _>("config")?
        .map(|raw| serde_json::from_str(&raw))
        .transpose()?;

    Ok(Agent {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        avatar: row.try_get("avatar")?,
        prompt: row.try_get("prompt")?,
        config,
        status: row.try_get::<String, _>("status")?.parse()?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn encode_config(config: Option<&Value>) -> AppResult<Option<String>> {
    Ok(config.map(serde_json::to_string).transpose()?)
}

impl Database {
    pub(super) async fn migrate_agents(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS agents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT,
                avatar TEXT,
                prompt TEXT,
                config TEXT,
                status TEXT NOT NULL DEFAULT 'draft' CHECK (status IN ('draft', 'published', 'archived')),
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_agents_user_id ON agents(user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Create an agent owned by `user_id`
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn create_agent(&self, user_id: i64, agent: &NewAgent) -> AppResult<Agent> {
        let now = Utc::now();
        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO agents (name, description, avatar, prompt, config, status, user_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING id
            ",
        )
        .bind(&agent.name)
        .bind(&agent.description)
        .bind(&agent.avatar)
        .bind(&agent.prompt)
        .bind(encode_config(agent.config.as_ref())?)
        .bind(agent.status.as_str())
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create agent: {e}")))?;

        self.get_agent(id, user_id)
            .await?
            .ok_or_else(|| AppError::internal("Created agent vanished"))
    }

    /// Get an agent owned by `user_id`
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn get_agent(&self, agent_id: i64, user_id: i64) -> AppResult<Option<Agent>> {
        let row = sqlx::query(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE id = $1 AND user_id = $2"
        ))
        .bind(agent_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get agent: {e}")))?;

        row.as_ref().map(agent_from_row).transpose()
    }

    /// List agents owned by `user_id`, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn list_agents(&self, user_id: i64, page: Page) -> AppResult<Paginated<Agent>> {
        let total = count(
            &self.pool,
            "SELECT COUNT(*) FROM agents WHERE user_id = $1",
            user_id,
        )
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE user_id = $1 ORDER BY id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list agents: {e}")))?;

        let items = rows.iter().map(agent_from_row).collect::<AppResult<Vec<_>>>()?;
        Ok(Paginated::new(items, total, page))
    }

    /// Apply a partial update to an agent owned by `user_id`
    ///
    /// Returns `None` when no such agent exists for this owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn update_agent(
        &self,
        agent_id: i64,
        user_id: i64,
        update: &AgentUpdate,
    ) -> AppResult<Option<Agent>> {
        let result = sqlx::query(
            r"
            UPDATE agents
            SET name = COALESCE($1, name),
                description = COALESCE($2, description),
                avatar = COALESCE($3, avatar),
                prompt = COALESCE($4, prompt),
                config = COALESCE($5, config),
                status = COALESCE($6, status),
                updated_at = $7
            WHERE id = $8 AND user_id = $9
            ",
        )
        .bind(&update.name)
        .bind(&update.description)
        .bind(&update.avatar)
        .bind(&update.prompt)
        .bind(encode_config(update.config.as_ref())?)
        .bind(update.status.as_ref().map(AgentStatus::as_str))
        .bind(Utc::now())
        .bind(agent_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to update agent: {e}")))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_agent(agent_id, user_id).await
    }

    /// Delete an agent owned by `user_id`
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn delete_agent(&self, agent_id: i64, user_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM agents WHERE id = $1 AND user_id = $2")
            .bind(agent_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete agent: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}
