// ABOUTME: Agent CRUD route handlers scoped to the authenticated owner
// ABOUTME: Lists with page/size pagination and hides other users' agents as not found
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::database::{AgentUpdate, NewAgent};
use crate::errors::{AppError, AppResult};
use crate::middleware::authenticate;
use crate::models::{Agent, AgentStatus};
use crate::pagination::PageParams;
use crate::resources::ServerResources;
use crate::responses::{ApiResponse, PageResponse};

/// Agent creation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAgentRequest {
    /// Display name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Avatar URL
    #[serde(default)]
    pub avatar: Option<String>,
    /// System prompt
    #[serde(default)]
    pub prompt: Option<String>,
    /// Arbitrary JSON configuration
    #[serde(default)]
    pub config: Option<Value>,
    /// Initial status, `draft` when omitted
    #[serde(default)]
    pub status: Option<AgentStatus>,
}

/// Agent update payload; omitted fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAgentRequest {
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Avatar URL
    #[serde(default)]
    pub avatar: Option<String>,
    /// System prompt
    #[serde(default)]
    pub prompt: Option<String>,
    /// Arbitrary JSON configuration
    #[serde(default)]
    pub config: Option<Value>,
    /// Status
    #[serde(default)]
    pub status: Option<AgentStatus>,
}

/// Agent routes
pub struct AgentRoutes;

impl AgentRoutes {
    /// Create all agent routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/agents", get(Self::list).post(Self::create))
            .route(
                "/api/agents/:id",
                get(Self::get).put(Self::update).delete(Self::delete),
            )
            .with_state(resources)
    }

    async fn list(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(params): Query<PageParams>,
    ) -> AppResult<PageResponse<Agent>> {
        let auth = authenticate(&headers, &resources.auth_manager)?;
        let page = resources
            .database
            .list_agents(auth.user_id, params.normalize())
            .await?;
        Ok(page.into())
    }

    async fn create(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(request): Json<CreateAgentRequest>,
    ) -> AppResult<ApiResponse<Agent>> {
        let auth = authenticate(&headers, &resources.auth_manager)?;
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::invalid_input("Agent name is required"));
        }

        let agent = resources
            .database
            .create_agent(
                auth.user_id,
                &NewAgent {
                    name: name.to_owned(),
                    description: request.description,
                    avatar: request.avatar,
                    prompt: request.prompt,
                    config: request.config,
                    status: request.status.unwrap_or_default(),
                },
            )
            .await?;

        info!(user_id = auth.user_id, agent_id = agent.id, "Created agent");
        Ok(ApiResponse::created(agent))
    }

    async fn get(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(agent_id): Path<i64>,
    ) -> AppResult<ApiResponse<Agent>> {
        let auth = authenticate(&headers, &resources.auth_manager)?;
        let agent = resources
            .database
            .get_agent(agent_id, auth.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Agent"))?;
        Ok(ApiResponse::ok(agent))
    }

    async fn update(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(agent_id): Path<i64>,
        Json(request): Json<UpdateAgentRequest>,
    ) -> AppResult<ApiResponse<Agent>> {
        let auth = authenticate(&headers, &resources.auth_manager)?;
        if request.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(AppError::invalid_input("Agent name cannot be empty"));
        }

        let update = AgentUpdate {
            name: request.name.map(|n| n.trim().to_owned()),
            description: request.description,
            avatar: request.avatar,
            prompt: request.prompt,
            config: request.config,
            status: request.status,
        };
        let agent = resources
            .database
            .update_agent(agent_id, auth.user_id, &update)
            .await?
            .ok_or_else(|| AppError::not_found("Agent"))?;
        Ok(ApiResponse::ok(agent))
    }

    async fn delete(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(agent_id): Path<i64>,
    ) -> AppResult<ApiResponse<()>> {
        let auth = authenticate(&headers, &resources.auth_manager)?;
        if !resources
            .database
            .delete_agent(agent_id, auth.user_id)
            .await?
        {
            return Err(AppError::not_found("Agent"));
        }
        info!(user_id = auth.user_id, agent_id, "Deleted agent");
        Ok(ApiResponse::ok(()).with_message("agent deleted"))
    }
}
