// ABOUTME: Health check route handlers for service monitoring and status endpoints
// ABOUTME: Liveness always answers; readiness probes the database and the shared cache
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;
use serde_json::{json, Value};
use tracing::warn;

use crate::cache::CacheProvider;
use crate::resources::ServerResources;

/// Health routes implementation
pub struct HealthRoutes;

impl HealthRoutes {
    /// Create all health check routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/health", get(Self::health))
            .route("/ready", get(Self::ready))
            .with_state(resources)
    }

    async fn health() -> Json<Value> {
        Json(json!({
            "status": "healthy",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    }

    async fn ready(State(resources): State<Arc<ServerResources>>) -> (StatusCode, Json<Value>) {
        let database = resources.database.health_check().await;
        let cache = resources.cache.health_check().await;

        if let Err(e) = &database {
            warn!("Readiness: database unavailable: {e}");
        }
        if let Err(e) = &cache {
            warn!("Readiness: cache unavailable: {e}");
        }

        let ready = database.is_ok() && cache.is_ok();
        let status = if ready {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (
            status,
            Json(json!({
                "status": if ready { "ready" } else { "not_ready" },
                "checks": {
                    "database": database.is_ok(),
                    "cache": cache.is_ok(),
                    "cache_backend": resources.cache.backend(),
                },
                "timestamp": chrono::Utc::now().to_rfc3339()
            })),
        )
    }
}
