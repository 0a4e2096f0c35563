// ABOUTME: Route module organization for the gateway's HTTP endpoints
// ABOUTME: Groups handlers by domain and provides the shared SSE response adapter
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Route modules
//!
//! Each domain module exposes a `*Routes` type whose `routes` function builds
//! an axum `Router` with its state attached. Handlers are thin: they
//! authenticate, translate the request, and delegate to the database, the
//! relay, or the upstream client.

/// Agent CRUD routes
pub mod agents;
/// Registration and login routes
pub mod auth;
/// Conversation and message routes, including the streaming turn
pub mod conversations;
/// Health and readiness routes
pub mod health;
/// Upstream token diagnostics and file upload
pub mod upstream;
/// Profile routes
pub mod users;
/// Workflow run routes
pub mod workflows;

pub use agents::AgentRoutes;
pub use auth::AuthRoutes;
pub use conversations::ConversationRoutes;
pub use health::HealthRoutes;
pub use upstream::UpstreamRoutes;
pub use users::UserRoutes;
pub use workflows::WorkflowRoutes;

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::relay::DownstreamEvent;

/// Adapt a relay receiver into an SSE response of `data: {type, data}` lines
///
/// When the client goes away axum drops this stream, which drops the
/// receiver and lets the relay task observe the disconnect.
pub fn sse_response(
    events: mpsc::Receiver<DownstreamEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream =
        ReceiverStream::new(events).map(|event| Ok(Event::default().data(event.to_json())));
    Sse::new(stream).keep_alive(KeepAlive::default())
}
