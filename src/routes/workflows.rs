// ABOUTME: Workflow run route handlers, blocking and streamed
// ABOUTME: Wraps the caller's text as the workflow `input` parameter
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{AppError, AppResult};
use crate::middleware::authenticate;
use crate::resources::ServerResources;
use crate::responses::ApiResponse;
use crate::routes::sse_response;
use crate::upstream::{WorkflowInput, WorkflowRunResult};

/// Workflow invocation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunWorkflowRequest {
    /// Text bound to the `input` parameter
    pub content: String,
    /// Additional named parameters
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl RunWorkflowRequest {
    fn into_input(self) -> AppResult<WorkflowInput> {
        if self.content.trim().is_empty() {
            return Err(AppError::invalid_input("Workflow input cannot be empty"));
        }
        Ok(WorkflowInput::text(self.content, self.parameters))
    }
}

/// Workflow routes
pub struct WorkflowRoutes;

impl WorkflowRoutes {
    /// Create all workflow routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/workflows/run", post(Self::run))
            .route("/api/workflows/stream", post(Self::stream))
            .with_state(resources)
    }

    async fn run(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(request): Json<RunWorkflowRequest>,
    ) -> AppResult<ApiResponse<WorkflowRunResult>> {
        authenticate(&headers, &resources.auth_manager)?;
        let result = resources
            .upstream
            .run_workflow(request.into_input()?)
            .await?;
        Ok(ApiResponse::ok(result))
    }

    async fn stream(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(request): Json<RunWorkflowRequest>,
    ) -> AppResult<impl IntoResponse> {
        authenticate(&headers, &resources.auth_manager)?;
        let events = resources.relay.stream_workflow(request.into_input()?);
        Ok(sse_response(events))
    }
}
