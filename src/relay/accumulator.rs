// ABOUTME: Per-turn accumulation of assistant text, upstream chat id, and token usage
// ABOUTME: Owned by a single relay task and turned into one assistant message at finalization
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::database::NewMessage;
use crate::upstream::{StreamEvent, Usage};

/// Accumulated state of one streaming turn
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TurnAccumulator {
    content: String,
    chat_id: Option<String>,
    usage: Usage,
    completed_events: usize,
}

impl TurnAccumulator {
    /// Fold one forwarded event into the tally
    pub fn absorb(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Delta(delta) => self.content.push_str(&delta.content),
            StreamEvent::Completed(completed) => {
                if completed.chat_id.is_some() {
                    self.chat_id.clone_from(&completed.chat_id);
                }
                self.usage = self.usage.merged(completed.usage);
                self.completed_events += 1;
            }
            StreamEvent::Failed(_) | StreamEvent::RequiresAction(_) | StreamEvent::Other(_) => {}
        }
    }

    /// Concatenated delta text in arrival order
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Last upstream chat id seen on a completed event
    #[must_use]
    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    /// Summed usage over all completed events
    #[must_use]
    pub const fn usage(&self) -> Usage {
        self.usage
    }

    /// Number of completed events absorbed
    #[must_use]
    pub const fn completed_events(&self) -> usize {
        self.completed_events
    }

    /// Tokens attributed to the assistant message
    #[must_use]
    pub const fn token_count(&self) -> i64 {
        self.usage.attributed_tokens()
    }

    /// The assistant message to persist, or `None` when no text arrived
    #[must_use]
    pub fn into_message(self, conversation_id: i64) -> Option<NewMessage> {
        if self.content.is_empty() {
            return None;
        }
        let token_count = self.token_count();
        Some(NewMessage::assistant(
            conversation_id,
            self.content,
            token_count,
            self.chat_id,
        ))
    }
}
