// ABOUTME: Closed stream event model and normalization of upstream chat/workflow SSE frames
// ABOUTME: Decodes the upstream event union once so the relay never inspects untyped maps
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Stream Events
//!
//! The upstream API emits a tagged union of events. [`normalize_chat_frame`]
//! and [`normalize_workflow_frame`] map each SSE frame onto a [`Normalized`]
//! outcome:
//!
//! - a typed [`StreamEvent`] (`delta`, `completed`, `failed`, `requires_action`, `other`)
//! - an in-stream error
//! - the end-of-stream signal
//! - nothing (keep-alives)
//!
//! End-of-stream is deliberately not a [`StreamEvent`]: one stream may carry
//! zero or more `completed` events before the transport closes.
//!
//! Unknown event names, and known names whose payload does not decode, become
//! [`StreamEvent::Other`] with the raw payload so new upstream features pass
//! through instead of breaking the relay.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{future, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::sse_parser::SseFrame;
use crate::constants::upstream::{chat_events, workflow_events, SERVICE_NAME};
use crate::errors::{AppError, AppResult};

/// Kind tag of a [`StreamEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventKind {
    /// Incremental assistant output
    Delta,
    /// Chat finished, carries usage
    Completed,
    /// Chat failed
    Failed,
    /// Upstream waits for client action
    RequiresAction,
    /// Anything else, passed through verbatim
    Other,
}

/// Incremental text fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaPayload {
    /// Text to append
    pub content: String,
    /// Author role, normally `assistant`
    pub role: String,
    /// Upstream message type (`answer`, `function_call`, ...)
    #[serde(rename = "type")]
    pub message_type: String,
    /// Content encoding (`text`, `object_string`, ...)
    pub content_type: String,
}

/// Token usage of one completed chat
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens
    #[serde(default)]
    pub input_count: i64,
    /// Completion tokens
    #[serde(default)]
    pub output_count: i64,
    /// Upstream-reported total
    #[serde(default)]
    pub token_count: i64,
}

impl Usage {
    /// Tokens to attribute to a message
    ///
    /// Input plus output, or the reported total when that is larger (some
    /// events only carry a total).
    #[must_use]
    pub const fn attributed_tokens(&self) -> i64 {
        let summed = self.input_count.saturating_add(self.output_count);
        if self.token_count > summed {
            self.token_count
        } else {
            summed
        }
    }

    /// Field-wise saturating sum of two usage reports
    #[must_use]
    pub const fn merged(self, other: Self) -> Self {
        Self {
            input_count: self.input_count.saturating_add(other.input_count),
            output_count: self.output_count.saturating_add(other.output_count),
            token_count: self.token_count.saturating_add(other.token_count),
        }
    }
}

/// Chat completion marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPayload {
    /// Upstream chat identifier
    pub chat_id: Option<String>,
    /// Usage reported for this chat
    pub usage: Usage,
}

/// Upstream-reported failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPayload {
    /// Upstream error code
    pub code: i64,
    /// Upstream error message
    pub message: String,
}

/// Opaque action descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiresActionPayload {
    /// Descriptor passed through untouched
    pub action: Value,
}

/// Unrecognized event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherPayload {
    /// Upstream event name
    pub event: String,
    /// Raw payload
    pub raw: String,
}

/// One normalized upstream event
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental assistant output
    Delta(DeltaPayload),
    /// Chat finished
    Completed(CompletedPayload),
    /// Chat failed
    Failed(FailedPayload),
    /// Upstream waits for client action
    RequiresAction(RequiresActionPayload),
    /// Unrecognized event
    Other(OtherPayload),
}

impl StreamEvent {
    /// Kind tag of this event
    #[must_use]
    pub const fn kind(&self) -> StreamEventKind {
        match self {
            Self::Delta(_) => StreamEventKind::Delta,
            Self::Completed(_) => StreamEventKind::Completed,
            Self::Failed(_) => StreamEventKind::Failed,
            Self::RequiresAction(_) => StreamEventKind::RequiresAction,
            Self::Other(_) => StreamEventKind::Other,
        }
    }

    /// Convenience constructor for an assistant text delta
    #[must_use]
    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::Delta(DeltaPayload {
            content: content.into(),
            role: "assistant".to_owned(),
            message_type: "answer".to_owned(),
            content_type: "text".to_owned(),
        })
    }

    fn other(frame: &SseFrame) -> Self {
        Self::Other(OtherPayload {
            event: frame.event_name().to_owned(),
            raw: frame.data.clone(),
        })
    }
}

/// Result of normalizing one SSE frame
#[derive(Debug)]
pub enum Normalized {
    /// A typed event
    Event(StreamEvent),
    /// In-stream upstream error; the stream ends after it
    Error(AppError),
    /// Upstream signalled end of stream
    End,
    /// Frame carries nothing for the relay
    Skip,
}

/// Chat message object as sent on the wire
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct WireMessage {
    #[serde(default)]
    pub role: String,
    #[serde(rename = "type", default)]
    pub message_type: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub content_type: String,
}

/// Chat object as sent on the wire
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct WireChat {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    pub usage: Option<Usage>,
    pub last_error: Option<WireError>,
    pub required_action: Option<Value>,
}

/// `{code, msg}` error object
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct WireError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
}

#[derive(Debug, Deserialize)]
struct WireWorkflowMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireWorkflowError {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    error_message: String,
}

fn decode<T: for<'de> Deserialize<'de>>(frame: &SseFrame) -> Option<T> {
    match serde_json::from_str(&frame.data) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(
                event = frame.event_name(),
                "Undecodable upstream payload, passing through: {e}"
            );
            None
        }
    }
}

/// Map one chat-stream frame onto the internal event model
#[must_use]
pub fn normalize_chat_frame(frame: &SseFrame) -> Normalized {
    let event = match frame.event_name() {
        chat_events::DONE => return Normalized::End,
        chat_events::ERROR => {
            let err = decode::<WireError>(frame).unwrap_or_else(|| WireError {
                code: 0,
                msg: frame.data.clone(),
            });
            return Normalized::Error(AppError::external_service(
                SERVICE_NAME,
                format!("stream error {}: {}", err.code, err.msg),
            ));
        }
        chat_events::MESSAGE_DELTA => decode::<WireMessage>(frame).map(|m| {
            StreamEvent::Delta(DeltaPayload {
                content: m.content,
                role: m.role,
                message_type: m.message_type,
                content_type: m.content_type,
            })
        }),
        chat_events::CHAT_COMPLETED => decode::<WireChat>(frame).map(|chat| {
            StreamEvent::Completed(CompletedPayload {
                chat_id: Some(chat.id).filter(|id| !id.is_empty()),
                usage: chat.usage.unwrap_or_default(),
            })
        }),
        chat_events::CHAT_FAILED => decode::<WireChat>(frame).map(|chat| {
            let err = chat.last_error.unwrap_or_default();
            StreamEvent::Failed(FailedPayload {
                code: err.code,
                message: if err.msg.is_empty() {
                    "chat failed".to_owned()
                } else {
                    err.msg
                },
            })
        }),
        chat_events::CHAT_REQUIRES_ACTION => decode::<WireChat>(frame).map(|chat| {
            StreamEvent::RequiresAction(RequiresActionPayload {
                action: chat.required_action.unwrap_or(Value::Null),
            })
        }),
        _ => None,
    };

    Normalized::Event(event.unwrap_or_else(|| StreamEvent::other(frame)))
}

/// Map one workflow-stream frame onto the internal event model
#[must_use]
pub fn normalize_workflow_frame(frame: &SseFrame) -> Normalized {
    let event = match frame.event_name() {
        workflow_events::DONE => return Normalized::End,
        workflow_events::PING => return Normalized::Skip,
        workflow_events::MESSAGE => {
            decode::<WireWorkflowMessage>(frame).map(|m| StreamEvent::assistant_text(m.content))
        }
        workflow_events::ERROR => decode::<WireWorkflowError>(frame).map(|e| {
            StreamEvent::Failed(FailedPayload {
                code: e.error_code,
                message: e.error_message,
            })
        }),
        workflow_events::INTERRUPT => decode::<Value>(frame).map(|action| {
            StreamEvent::RequiresAction(RequiresActionPayload { action })
        }),
        _ => None,
    };

    Normalized::Event(event.unwrap_or_else(|| StreamEvent::other(frame)))
}

/// Boxed, finite, single-pass stream of normalized events
pub type EventStream = Pin<Box<dyn Stream<Item = AppResult<StreamEvent>> + Send>>;

/// Normalize a frame stream, stopping at the end signal or after the first error
pub fn normalized_events<S>(frames: S, normalize: fn(&SseFrame) -> Normalized) -> EventStream
where
    S: Stream<Item = AppResult<SseFrame>> + Send + 'static,
{
    let mut failed = false;
    let stream = frames
        .map(move |frame| match frame {
            Ok(frame) => normalize(&frame),
            Err(e) => Normalized::Error(e),
        })
        .take_while(move |item| {
            let keep = !failed && !matches!(item, Normalized::End);
            failed |= matches!(item, Normalized::Error(_));
            future::ready(keep)
        })
        .filter_map(|item| {
            future::ready(match item {
                Normalized::Event(event) => Some(Ok(event)),
                Normalized::Error(e) => Some(Err(e)),
                Normalized::End | Normalized::Skip => None,
            })
        });
    Box::pin(stream)
}

/// An open upstream event stream
///
/// Yields events in arrival order and ends (`None`) when the upstream signals
/// end-of-stream or the transport closes. Dropping it closes the upstream
/// connection.
pub struct EventSource {
    log_id: Option<String>,
    events: EventStream,
}

impl EventSource {
    /// Wrap an event stream
    pub fn new<S>(log_id: Option<String>, events: S) -> Self
    where
        S: Stream<Item = AppResult<StreamEvent>> + Send + 'static,
    {
        Self {
            log_id,
            events: Box::pin(events),
        }
    }

    /// Upstream log id of the request that opened this stream
    #[must_use]
    pub fn log_id(&self) -> Option<&str> {
        self.log_id.as_deref()
    }
}

impl std::fmt::Debug for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource")
            .field("log_id", &self.log_id)
            .finish_non_exhaustive()
    }
}

impl Stream for EventSource {
    type Item = AppResult<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.as_mut().poll_next(cx)
    }
}
