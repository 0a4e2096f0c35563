// ABOUTME: Pass-through routes to the upstream agent service
// ABOUTME: Exposes the shared access token and proxies multipart file uploads
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::io::Cursor;
use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::middleware::authenticate;
use crate::resources::ServerResources;
use crate::responses::ApiResponse;
use crate::upstream::{UploadSource, UploadedFile};

/// Multipart field carrying the upload
const UPLOAD_FIELD: &str = "file";

/// Access token handed to clients that talk to the upstream directly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    /// Bearer token for the upstream API
    pub access_token: String,
}

/// Upstream pass-through routes
pub struct UpstreamRoutes;

impl UpstreamRoutes {
    /// Create all upstream pass-through routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/coze/token", get(Self::access_token))
            .route("/api/common/upload/file", post(Self::upload_file))
            .with_state(resources)
    }

    async fn access_token(
        State(resources): State<Arc<ServerResources>>,
    ) -> AppResult<Json<AccessTokenResponse>> {
        let access_token = resources.credentials.ensure_token().await?;
        Ok(Json(AccessTokenResponse { access_token }))
    }

    async fn upload_file(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        mut multipart: Multipart,
    ) -> AppResult<ApiResponse<UploadedFile>> {
        let auth = authenticate(&headers, &resources.auth_manager)?;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::invalid_input(format!("Malformed multipart body: {e}")))?
        {
            if field.name() != Some(UPLOAD_FIELD) {
                continue;
            }
            let file_name = field
                .file_name()
                .filter(|n| !n.is_empty())
                .unwrap_or("upload")
                .to_owned();
            let body = field
                .bytes()
                .await
                .map_err(|e| AppError::invalid_input(format!("Failed to read upload: {e}")))?;

            let uploaded = resources
                .upstream
                .upload(UploadSource {
                    file_name,
                    reader: Box::new(Cursor::new(body)),
                })
                .await?;
            info!(
                user_id = auth.user_id,
                file_id = %uploaded.file_id,
                size = uploaded.size,
                "Uploaded file"
            );
            return Ok(ApiResponse::ok(uploaded));
        }

        Err(AppError::invalid_input(format!(
            "Multipart field '{UPLOAD_FIELD}' is required"
        )))
    }
}
