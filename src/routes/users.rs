// ABOUTME: Profile route handlers for the authenticated user
// ABOUTME: Reads and partially updates nickname and avatar
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::database::ProfileUpdate;
use crate::errors::{AppError, AppResult};
use crate::middleware::authenticate;
use crate::models::User;
use crate::resources::ServerResources;
use crate::responses::ApiResponse;

/// Profile update payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    /// Display name
    #[serde(default)]
    pub nickname: Option<String>,
    /// Avatar URL
    #[serde(default)]
    pub avatar: Option<String>,
}

/// User profile routes
pub struct UserRoutes;

impl UserRoutes {
    /// Create all profile routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/api/users/profile",
                get(Self::get_profile).put(Self::update_profile),
            )
            .with_state(resources)
    }

    async fn get_profile(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> AppResult<ApiResponse<User>> {
        let auth = authenticate(&headers, &resources.auth_manager)?;
        let user = resources
            .database
            .get_user(auth.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;
        Ok(ApiResponse::ok(user))
    }

    async fn update_profile(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(request): Json<UpdateProfileRequest>,
    ) -> AppResult<ApiResponse<User>> {
        let auth = authenticate(&headers, &resources.auth_manager)?;
        let user = resources
            .database
            .update_user_profile(
                auth.user_id,
                &ProfileUpdate {
                    nickname: request.nickname,
                    avatar: request.avatar,
                },
            )
            .await?;
        Ok(ApiResponse::ok(user).with_message("profile updated"))
    }
}
