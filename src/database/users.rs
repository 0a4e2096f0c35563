// ABOUTME: User account database operations
// ABOUTME: Handles registration, lookup by id or login name, and profile updates
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{write_error, Database};
use crate::errors::{AppError, AppResult};
use crate::models::User;

/// Fields of a new account
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Unique login name
    pub username: String,
    /// Unique email address
    pub email: String,
    /// bcrypt hash
    pub password_hash: String,
    /// Display name
    pub nickname: Option<String>,
}

/// Editable profile fields; `None` leaves the column unchanged
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    /// Display name
    pub nickname: Option<String>,
    /// Avatar URL
    pub avatar: Option<String>,
}

fn user_from_row(row: &SqliteRow) -> AppResult<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        nickname: row.try_get("nickname")?,
        avatar: row.try_get("avatar")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        role: row.try_get::<String, _>("role")?.parse()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, nickname, avatar, status, role, created_at, updated_at";

impl Database {
    pub(super) async fn migrate_users(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                nickname TEXT,
                avatar TEXT,
                status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'disabled')),
                role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create a user account
    ///
    /// # Errors
    ///
    /// Returns a conflict if the username or email is taken, otherwise a database error
    pub async fn create_user(&self, user: &NewUser) -> AppResult<User> {
        let now = Utc::now();
        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO users (username, email, password_hash, nickname, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING id
            ",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.nickname)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "Username or email already registered", "Failed to create user"))?;

        self.get_user(id)
            .await?
            .ok_or_else(|| AppError::internal("Created user vanished"))
    }

    /// Get a user by id
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn get_user(&self, user_id: i64) -> AppResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to get user: {e}")))?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// Get a user by username or email
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn get_user_by_login(&self, login: &str) -> AppResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $1"
        ))
        .bind(login)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get user: {e}")))?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// Update profile fields
    ///
    /// # Errors
    ///
    /// Returns not-found if the user does not exist, otherwise a database error
    pub async fn update_user_profile(&self, user_id: i64, update: &ProfileUpdate) -> AppResult<User> {
        let result = sqlx::query(
            r"
            UPDATE users
            SET nickname = COALESCE($1, nickname),
                avatar = COALESCE($2, avatar),
                updated_at = $3
            WHERE id = $4
            ",
        )
        .bind(&update.nickname)
        .bind(&update.avatar)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to update user profile: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("User"));
        }
        self.get_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))
    }
}
