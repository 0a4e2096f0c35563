// ABOUTME: Typed downstream SSE events emitted by the relay as {type, data} JSON
// ABOUTME: Maps normalized upstream events onto the client-facing event vocabulary
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use serde::{Deserialize, Serialize};

use crate::constants::events;
use crate::upstream::events::{DeltaPayload, RequiresActionPayload};
use crate::upstream::{StreamEvent, Usage};

/// First event of every stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartData {
    /// Local conversation id, absent for workflow streams
    pub conversation_id: Option<i64>,
    /// Upstream conversation id
    pub external_conversation_id: Option<String>,
    /// Persisted user message id
    pub user_message_id: Option<i64>,
}

/// Upstream chat finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletedData {
    /// Upstream chat id
    pub chat_id: Option<String>,
    /// Usage of this chat
    pub usage: Usage,
}

/// Upstream chat failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatFailedData {
    /// Upstream error code
    pub error_code: i64,
    /// Upstream error message
    pub error_msg: String,
}

/// Unrecognized upstream event, passed through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherEventData {
    /// Upstream event name
    pub event: String,
    /// Raw upstream payload
    pub raw_data: String,
}

/// Relay-level failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    /// Client-safe message
    pub message: String,
}

/// Final event of a successful stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndData {
    /// Always `completed`
    pub status: String,
    /// Upstream log id, for support requests
    pub log_id: Option<String>,
}

/// One event written to the downstream SSE response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DownstreamEvent {
    /// Stream opened
    Start(StartData),
    /// Incremental assistant output
    MessageDelta(DeltaPayload),
    /// Upstream chat finished
    ChatCompleted(ChatCompletedData),
    /// Upstream chat failed
    ChatFailed(ChatFailedData),
    /// Client action required
    RequiresAction(RequiresActionPayload),
    /// Unrecognized upstream event
    OtherEvent(OtherEventData),
    /// Relay-level failure; no further events follow
    Error(ErrorData),
    /// Normal termination
    End(EndData),
}

impl DownstreamEvent {
    /// Relay-level error event
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorData {
            message: message.into(),
        })
    }

    /// Normal termination event
    #[must_use]
    pub fn end(log_id: Option<String>) -> Self {
        Self::End(EndData {
            status: "completed".to_owned(),
            log_id,
        })
    }

    /// Wire name of this event's `type`
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start(_) => events::START,
            Self::MessageDelta(_) => events::MESSAGE_DELTA,
            Self::ChatCompleted(_) => events::CHAT_COMPLETED,
            Self::ChatFailed(_) => events::CHAT_FAILED,
            Self::RequiresAction(_) => events::REQUIRES_ACTION,
            Self::OtherEvent(_) => events::OTHER_EVENT,
            Self::Error(_) => events::ERROR,
            Self::End(_) => events::END,
        }
    }

    /// Serialize as the `{type, data}` JSON written into an SSE `data:` line
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "type": events::ERROR, "data": { "message": e.to_string() } })
                .to_string()
        })
    }

    /// Parse a `{type, data}` JSON line back into an event
    ///
    /// # Errors
    ///
    /// Returns the serde error when the line is not a known event
    pub fn from_json(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

impl From<StreamEvent> for DownstreamEvent {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::Delta(delta) => Self::MessageDelta(delta),
            StreamEvent::Completed(completed) => Self::ChatCompleted(ChatCompletedData {
                chat_id: completed.chat_id,
                usage: completed.usage,
            }),
            StreamEvent::Failed(failed) => Self::ChatFailed(ChatFailedData {
                error_code: failed.code,
                error_msg: failed.message,
            }),
            StreamEvent::RequiresAction(action) => Self::RequiresAction(action),
            StreamEvent::Other(other) => Self::OtherEvent(OtherEventData {
                event: other.event,
                raw_data: other.raw,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    #[test]
    fn delta_serializes_as_type_and_data() {
        let event = DownstreamEvent::from(StreamEvent::assistant_text("Hi"));
        let json: Value = serde_json::from_str(&event.to_json()).unwrap_or_default();
        assert_eq!(json["type"], events::MESSAGE_DELTA);
        assert_eq!(json["data"]["content"], "Hi");
        assert_eq!(json["data"]["type"], "answer");
    }

    #[test]
    fn end_carries_completed_status() {
        let json: Value =
            serde_json::from_str(&DownstreamEvent::end(Some("log-1".to_owned())).to_json())
                .unwrap_or_default();
        assert_eq!(json["type"], "end");
        assert_eq!(json["data"]["status"], "completed");
        assert_eq!(json["data"]["log_id"], "log-1");
    }
}
