// ABOUTME: SQLite persistence for users, agents, conversations, and messages
// ABOUTME: Owns the connection pool and creates the schema at startup
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Database Management
//!
//! Every record kind lives in its own submodule as an `impl Database` block.
//! The schema is created with `CREATE TABLE IF NOT EXISTS` on connect, with
//! foreign keys enforced so deleting a conversation removes its messages.

mod agents;
mod chat;
mod users;

pub use agents::{AgentUpdate, NewAgent};
pub use chat::NewMessage;
pub use users::{NewUser, ProfileUpdate};

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::environment::DatabaseUrl;
use crate::errors::{AppError, AppResult};

/// Database manager shared by handlers and the relay
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema cannot be created
    pub async fn connect(url: &DatabaseUrl) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(&url.to_connection_string())
            .map_err(|e| AppError::config(format!("Invalid database URL: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        // Each connection to :memory: is its own database, so pin a single one
        let pool_options = if url.is_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(10)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| AppError::database(format!("Failed to open database: {e}")))?;

        let db = Self { pool };
        db.migrate().await?;
        info!(database = %url.to_connection_string(), "Database ready");
        Ok(db)
    }

    /// Get a reference to the database pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create all tables and indexes
    ///
    /// # Errors
    ///
    /// Returns an error if any DDL statement fails
    pub async fn migrate(&self) -> AppResult<()> {
        self.migrate_users().await?;
        self.migrate_agents().await?;
        self.migrate_chat().await?;
        Ok(())
    }

    /// Round-trip a trivial query
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot serve a query
    pub async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Database health check failed: {e}")))?;
        Ok(())
    }
}

/// Map a unique-constraint violation to a conflict, anything else to a database error
fn write_error(err: sqlx::Error, conflict: &str, context: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::already_exists(conflict),
        _ => AppError::database(format!("{context}: {err}")),
    }
}

/// Count rows for a paginated listing
async fn count(pool: &SqlitePool, sql: &str, owner_id: i64) -> AppResult<i64> {
    let total: i64 = sqlx::query_scalar(sql)
        .bind(owner_id)
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to count rows: {e}")))?;
    Ok(total)
}
