// ABOUTME: Conversation and message route handlers, including the SSE chat stream
// ABOUTME: Delegates turns to the stream relay and scopes every lookup to the caller
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Conversation Routes
//!
//! `POST /api/conversations/:id/messages/stream` answers with
//! `text/event-stream`. Validation and ownership failures surface as plain
//! HTTP errors before the stream opens; anything later is reported in-band
//! as an `error` event.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::relay::DEFAULT_TITLE;
use crate::errors::{AppError, AppResult};
use crate::middleware::authenticate;
use crate::models::{Conversation, Message};
use crate::pagination::PageParams;
use crate::relay::{TurnReply, TurnRequest};
use crate::resources::ServerResources;
use crate::responses::{ApiResponse, PageResponse};
use crate::routes::sse_response;

/// Conversation creation payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    /// Optional title; a default is used when blank
    #[serde(default)]
    pub title: Option<String>,
}

/// New user message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    /// Message text
    pub content: String,
}

/// Conversation routes
pub struct ConversationRoutes;

impl ConversationRoutes {
    /// Create all conversation routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/conversations", get(Self::list).post(Self::create))
            .route(
                "/api/conversations/:id",
                get(Self::get).delete(Self::delete),
            )
            .route(
                "/api/conversations/:id/messages",
                get(Self::list_messages).post(Self::send_message),
            )
            .route(
                "/api/conversations/:id/messages/stream",
                post(Self::stream_message),
            )
            .with_state(resources)
    }

    async fn list(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(params): Query<PageParams>,
    ) -> AppResult<PageResponse<Conversation>> {
        let auth = authenticate(&headers, &resources.auth_manager)?;
        let page = resources
            .database
            .list_conversations(auth.user_id, params.normalize())
            .await?;
        Ok(page.into())
    }

    async fn create(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        body: Option<Json<CreateConversationRequest>>,
    ) -> AppResult<ApiResponse<Conversation>> {
        let auth = authenticate(&headers, &resources.auth_manager)?;
        let request = body.map(|Json(r)| r).unwrap_or_default();
        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE);

        let external_id = resources.upstream.create_conversation().await?;
        let conversation = resources
            .database
            .create_conversation(auth.user_id, &external_id, title)
            .await?;

        info!(
            user_id = auth.user_id,
            conversation_id = conversation.id,
            external_conversation_id = %external_id,
            "Created conversation"
        );
        Ok(ApiResponse::created(conversation))
    }

    async fn get(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(conversation_id): Path<i64>,
    ) -> AppResult<ApiResponse<Conversation>> {
        let auth = authenticate(&headers, &resources.auth_manager)?;
        let conversation = resources
            .database
            .get_conversation(conversation_id, auth.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))?;
        Ok(ApiResponse::ok(conversation))
    }

    async fn delete(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(conversation_id): Path<i64>,
    ) -> AppResult<ApiResponse<()>> {
        let auth = authenticate(&headers, &resources.auth_manager)?;
        if !resources
            .database
            .delete_conversation(conversation_id, auth.user_id)
            .await?
        {
            return Err(AppError::not_found("Conversation"));
        }
        Ok(ApiResponse::ok(()).with_message("conversation deleted"))
    }

    async fn list_messages(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(conversation_id): Path<i64>,
        Query(params): Query<PageParams>,
    ) -> AppResult<PageResponse<Message>> {
        let auth = authenticate(&headers, &resources.auth_manager)?;
        resources
            .database
            .get_conversation(conversation_id, auth.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))?;

        let page = resources
            .database
            .list_messages(conversation_id, params.normalize())
            .await?;
        Ok(page.into())
    }

    async fn send_message(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(conversation_id): Path<i64>,
        Json(request): Json<SendMessageRequest>,
    ) -> AppResult<ApiResponse<TurnReply>> {
        let auth = authenticate(&headers, &resources.auth_manager)?;
        let reply = resources
            .relay
            .send_message(&TurnRequest {
                user_id: auth.user_id,
                conversation_id,
                content: request.content,
            })
            .await?;
        Ok(ApiResponse::ok(reply))
    }

    async fn stream_message(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(conversation_id): Path<i64>,
        Json(request): Json<SendMessageRequest>,
    ) -> AppResult<impl IntoResponse> {
        let auth = authenticate(&headers, &resources.auth_manager)?;
        let events = resources
            .relay
            .stream_turn(&TurnRequest {
                user_id: auth.user_id,
                conversation_id,
                content: request.content,
            })
            .await?;
        Ok(sse_response(events))
    }
}
