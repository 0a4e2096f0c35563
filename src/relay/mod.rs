// ABOUTME: Stream relay orchestrating one conversational turn between the store and the upstream agent
// ABOUTME: Persists the user message, forwards upstream events downstream in order, and finalizes once
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Stream Relay
//!
//! A streaming turn runs in two phases.
//!
//! [`StreamRelay::prepare_turn`] runs inside the request handler: it resolves
//! (or creates) the conversation, reads the history window and persists the
//! user message. Any failure here is an ordinary error response and no
//! upstream call is made.
//!
//! [`StreamRelay::spawn_stream`] then moves the turn into its own task, which
//! writes [`DownstreamEvent`]s into a bounded channel:
//!
//! ```text
//! start -> (message_delta | chat_completed | requires_action | other_event)* -> end
//!                                                                          \-> error
//!                                                                          \-> chat_failed
//! ```
//!
//! The task owns its [`TurnAccumulator`]. On normal upstream end the
//! accumulated assistant text is persisted exactly once; a failed write is
//! logged and `end` is still sent. An upstream error produces a single
//! `error` event and nothing is persisted. A `chat_failed` event from upstream
//! is terminal in the same way: it is forwarded, then the stream closes with
//! no `end` and no assistant message. When the receiver is dropped the
//! task stops forwarding, drops the upstream stream and, unless
//! `save_partial_on_disconnect` is set, persists nothing.

/// Per-turn accumulation
pub mod accumulator;
/// Downstream SSE event vocabulary
pub mod events;
/// Persistence contract
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub use accumulator::TurnAccumulator;
pub use events::{DownstreamEvent, StartData};
pub use store::ConversationStore;

use crate::config::environment::{CozeConfig, RelayConfig};
use crate::constants::relay::{
    DEFAULT_HISTORY_WINDOW, DEFAULT_TITLE, DOWNSTREAM_CHANNEL_CAPACITY, TITLE_MAX_CHARS,
};
use crate::constants::upstream::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::database::NewMessage;
use crate::errors::{AppError, AppResult};
use crate::models::{Conversation, Message};
use crate::upstream::{
    ChatStreamRequest, EventSource, HistoryMessage, StreamEvent, UpstreamApi, WorkflowInput,
};

/// Relay tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOptions {
    /// Messages of history sent upstream
    pub history_window: i64,
    /// Ceiling on one upstream stream
    pub stream_timeout: Duration,
    /// Bounded channel capacity towards the SSE response
    pub channel_capacity: usize,
    /// Persist accumulated text when the client disconnects mid-stream
    pub save_partial_on_disconnect: bool,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            history_window: DEFAULT_HISTORY_WINDOW,
            stream_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            channel_capacity: DOWNSTREAM_CHANNEL_CAPACITY,
            save_partial_on_disconnect: false,
        }
    }
}

impl RelayOptions {
    /// Build from server configuration
    #[must_use]
    pub fn from_config(relay: &RelayConfig, coze: &CozeConfig) -> Self {
        Self {
            history_window: relay.history_window,
            stream_timeout: coze.request_timeout,
            channel_capacity: DOWNSTREAM_CHANNEL_CAPACITY,
            save_partial_on_disconnect: relay.save_partial_on_disconnect,
        }
    }
}

/// One incoming user turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    /// Authenticated caller
    pub user_id: i64,
    /// Target conversation; `0` creates a new one
    pub conversation_id: i64,
    /// User message text
    pub content: String,
}

/// A turn whose user message is already persisted
#[derive(Debug, Clone)]
pub struct PreparedTurn {
    /// Resolved conversation
    pub conversation: Conversation,
    /// Persisted user message
    pub user_message: Message,
    /// Prior messages, oldest first, excluding `user_message`
    pub history: Vec<HistoryMessage>,
}

/// Result of a non-streaming turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnReply {
    /// Conversation the turn belongs to
    pub conversation: Conversation,
    /// Persisted user message
    pub user_message: Message,
    /// Persisted assistant reply
    pub assistant_message: Message,
}

/// How the event loop ended
#[derive(Debug)]
enum PumpOutcome {
    /// Upstream signalled end of stream
    Finished(TurnAccumulator),
    /// Upstream reported an error
    Failed(AppError),
    /// Upstream chat failed; the `chat_failed` event is already forwarded
    Rejected,
    /// Receiver dropped
    Disconnected(TurnAccumulator),
}

/// Conversation title: first line of the message, bounded in length
#[must_use]
pub fn derive_title(content: &str) -> String {
    let first_line = content.lines().map(str::trim).find(|l| !l.is_empty());
    first_line.map_or_else(
        || DEFAULT_TITLE.to_owned(),
        |line| line.chars().take(TITLE_MAX_CHARS).collect(),
    )
}

/// Orchestrates turns between the store and the upstream agent
#[derive(Clone)]
pub struct StreamRelay {
    store: Arc<dyn ConversationStore>,
    upstream: Arc<dyn UpstreamApi>,
    options: RelayOptions,
}

impl StreamRelay {
    /// Create a relay over explicit collaborators
    #[must_use]
    pub fn new(
        store: Arc<dyn ConversationStore>,
        upstream: Arc<dyn UpstreamApi>,
        options: RelayOptions,
    ) -> Self {
        Self {
            store,
            upstream,
            options,
        }
    }

    /// Relay tuning in effect
    #[must_use]
    pub const fn options(&self) -> &RelayOptions {
        &self.options
    }

    /// Resolve the conversation, read history, and persist the user message
    ///
    /// # Errors
    ///
    /// Returns invalid-input for blank content, not-found when the caller does
    /// not own the conversation, and upstream or database errors from
    /// creating the conversation or persisting the message
    pub async fn prepare_turn(&self, request: &TurnRequest) -> AppResult<PreparedTurn> {
        if request.content.trim().is_empty() {
            return Err(AppError::invalid_input("Message content must not be empty"));
        }

        let (conversation, history) = if request.conversation_id == 0 {
            let external_id = self.upstream.create_conversation().await?;
            let conversation = self
                .store
                .create_conversation(
                    request.user_id,
                    &external_id,
                    &derive_title(&request.content),
                )
                .await?;
            info!(
                conversation_id = conversation.id,
                external_conversation_id = %external_id,
                "Created conversation for new turn"
            );
            (conversation, Vec::new())
        } else {
            let conversation = self
                .store
                .get_conversation(request.conversation_id, request.user_id)
                .await?
                .ok_or_else(|| AppError::not_found("Conversation"))?;
            let history = self
                .store
                .recent_messages(conversation.id, self.options.history_window)
                .await?
                .into_iter()
                .map(|m| HistoryMessage {
                    role: m.role,
                    content: m.content,
                })
                .collect();
            (conversation, history)
        };

        let user_message = self
            .store
            .add_message(&NewMessage::user(conversation.id, request.content.clone()))
            .await?;

        Ok(PreparedTurn {
            conversation,
            user_message,
            history,
        })
    }

    /// Run the streaming phase of a prepared turn in its own task
    ///
    /// The returned receiver yields the downstream events; dropping it is
    /// treated as a client disconnect.
    #[must_use]
    pub fn spawn_stream(&self, turn: PreparedTurn) -> mpsc::Receiver<DownstreamEvent> {
        let (tx, rx) = mpsc::channel(self.options.channel_capacity);
        let relay = self.clone();
        tokio::spawn(async move { relay.run_chat(turn, tx).await });
        rx
    }

    /// Prepare and stream a turn
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::prepare_turn`]; later failures are in-band
    pub async fn stream_turn(
        &self,
        request: &TurnRequest,
    ) -> AppResult<mpsc::Receiver<DownstreamEvent>> {
        let turn = self.prepare_turn(request).await?;
        Ok(self.spawn_stream(turn))
    }

    /// Run a turn to completion without streaming
    ///
    /// The user message is persisted before the upstream call, as in the
    /// streaming path.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::prepare_turn`], the upstream error, or
    /// the database error from persisting the reply
    pub async fn send_message(&self, request: &TurnRequest) -> AppResult<TurnReply> {
        let turn = self.prepare_turn(request).await?;
        let reply = self
            .upstream
            .send_message(
                &turn.conversation.external_conversation_id,
                &request.user_id.to_string(),
                &request.content,
            )
            .await?;

        let assistant_message = self
            .store
            .add_message(&NewMessage::assistant(
                turn.conversation.id,
                reply.content,
                reply.usage.attributed_tokens(),
                Some(reply.chat_id),
            ))
            .await?;

        Ok(TurnReply {
            conversation: turn.conversation,
            user_message: turn.user_message,
            assistant_message,
        })
    }

    /// Stream a workflow run; nothing is persisted
    #[must_use]
    pub fn stream_workflow(&self, input: WorkflowInput) -> mpsc::Receiver<DownstreamEvent> {
        let (tx, rx) = mpsc::channel(self.options.channel_capacity);
        let relay = self.clone();
        tokio::spawn(async move { relay.run_workflow(input, tx).await });
        rx
    }

    async fn run_chat(self, turn: PreparedTurn, tx: mpsc::Sender<DownstreamEvent>) {
        let conversation_id = turn.conversation.id;
        let start = DownstreamEvent::Start(StartData {
            conversation_id: Some(conversation_id),
            external_conversation_id: Some(turn.conversation.external_conversation_id.clone()),
            user_message_id: Some(turn.user_message.id),
        });
        if tx.send(start).await.is_err() {
            debug!(conversation_id, "Client gone before stream start");
            return;
        }

        let request = ChatStreamRequest {
            external_conversation_id: turn.conversation.external_conversation_id,
            user_id: turn.conversation.user_id.to_string(),
            history: turn.history,
            text: turn.user_message.content,
        };
        let source = match self.upstream.open_chat_stream(request).await {
            Ok(source) => source,
            Err(e) => {
                warn!(conversation_id, "Failed to open upstream chat stream: {e}");
                let _ = tx.send(DownstreamEvent::error(e.client_message())).await;
                return;
            }
        };

        let log_id = source.log_id().map(str::to_owned);
        match self.pump(source, &tx).await {
            PumpOutcome::Finished(acc) => {
                info!(
                    conversation_id,
                    log_id = ?log_id,
                    completed_events = acc.completed_events(),
                    "Upstream chat stream finished"
                );
                self.finalize(conversation_id, acc).await;
                let _ = tx.send(DownstreamEvent::end(log_id)).await;
            }
            PumpOutcome::Failed(e) => {
                warn!(conversation_id, log_id = ?log_id, "Upstream chat stream failed: {e}");
                let _ = tx.send(DownstreamEvent::error(e.client_message())).await;
            }
            PumpOutcome::Rejected => {
                warn!(conversation_id, log_id = ?log_id, "Upstream chat failed; discarding partial reply");
            }
            PumpOutcome::Disconnected(acc) => {
                info!(conversation_id, "Client disconnected mid-stream");
                if self.options.save_partial_on_disconnect {
                    self.finalize(conversation_id, acc).await;
                }
            }
        }
    }

    async fn run_workflow(self, input: WorkflowInput, tx: mpsc::Sender<DownstreamEvent>) {
        if tx.send(DownstreamEvent::Start(StartData::default())).await.is_err() {
            return;
        }

        let source = match self.upstream.open_workflow_stream(input).await {
            Ok(source) => source,
            Err(e) => {
                warn!("Failed to open upstream workflow stream: {e}");
                let _ = tx.send(DownstreamEvent::error(e.client_message())).await;
                return;
            }
        };

        let log_id = source.log_id().map(str::to_owned);
        match self.pump(source, &tx).await {
            PumpOutcome::Finished(_) => {
                let _ = tx.send(DownstreamEvent::end(log_id)).await;
            }
            PumpOutcome::Failed(e) => {
                warn!(log_id = ?log_id, "Upstream workflow stream failed: {e}");
                let _ = tx.send(DownstreamEvent::error(e.client_message())).await;
            }
            PumpOutcome::Rejected => warn!(log_id = ?log_id, "Upstream workflow run failed"),
            PumpOutcome::Disconnected(_) => debug!("Client disconnected from workflow stream"),
        }
    }

    /// Forward upstream events in order until the stream ends or fails or the client leaves
    ///
    /// A forwarded `Failed` event ends the loop. Returning drops `source`,
    /// which closes the upstream connection.
    async fn pump(
        &self,
        mut source: EventSource,
        tx: &mpsc::Sender<DownstreamEvent>,
    ) -> PumpOutcome {
        let mut acc = TurnAccumulator::default();
        let deadline = tokio::time::sleep(self.options.stream_timeout);
        tokio::pin!(deadline);

        loop {
            let next = tokio::select! {
                biased;
                () = tx.closed() => return PumpOutcome::Disconnected(acc),
                () = &mut deadline => {
                    return PumpOutcome::Failed(AppError::upstream_unavailable(format!(
                        "Upstream stream exceeded {}s",
                        self.options.stream_timeout.as_secs()
                    )));
                }
                next = source.next() => next,
            };

            match next {
                None => return PumpOutcome::Finished(acc),
                Some(Err(e)) => return PumpOutcome::Failed(e),
                Some(Ok(event)) => {
                    let failed = matches!(event, StreamEvent::Failed(_));
                    acc.absorb(&event);
                    if tx.send(DownstreamEvent::from(event)).await.is_err() {
                        return PumpOutcome::Disconnected(acc);
                    }
                    if failed {
                        return PumpOutcome::Rejected;
                    }
                }
            }
        }
    }

    /// Persist the accumulated assistant message; failures are logged only
    async fn finalize(&self, conversation_id: i64, acc: TurnAccumulator) -> Option<Message> {
        let message = acc.into_message(conversation_id)?;
        match self.store.add_message(&message).await {
            Ok(saved) => {
                debug!(
                    conversation_id,
                    message_id = saved.id,
                    token_count = saved.token_count,
                    "Persisted assistant message"
                );
                Some(saved)
            }
            Err(e) => {
                error!(conversation_id, "Failed to persist assistant message: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_uses_first_non_empty_line() {
        assert_eq!(derive_title("Hello\nWorld"), "Hello");
        assert_eq!(derive_title("\n  \n  Second  \nThird"), "Second");
        assert_eq!(derive_title("   "), DEFAULT_TITLE);
    }

    #[test]
    fn title_is_bounded_by_characters() {
        let long = "é".repeat(TITLE_MAX_CHARS + 20);
        assert_eq!(derive_title(&long).chars().count(), TITLE_MAX_CHARS);
    }
}
