// ABOUTME: Integration tests for the stream relay turn lifecycle
// ABOUTME: Covers persistence, in-band errors, disconnects, and usage accounting
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{create_test_database, MockUpstream, StreamScript};
use coze_gateway::database::{Database, NewMessage, NewUser};
use coze_gateway::errors::{AppError, AppResult, ErrorCode};
use coze_gateway::models::{Conversation, Message, MessageRole};
use coze_gateway::pagination::PageParams;
use coze_gateway::relay::{
    ConversationStore, DownstreamEvent, RelayOptions, StreamRelay, TurnRequest,
};
use coze_gateway::upstream::events::{CompletedPayload, FailedPayload};
use coze_gateway::upstream::{StreamEvent, Usage};
use tokio::sync::mpsc;

fn completed(input: i64, output: i64) -> StreamEvent {
    StreamEvent::Completed(CompletedPayload {
        chat_id: Some("chat-1".to_owned()),
        usage: Usage {
            input_count: input,
            output_count: output,
            token_count: 0,
        },
    })
}

async fn create_user(database: &Database) -> i64 {
    database
        .create_user(&NewUser {
            username: "relay-user".to_owned(),
            email: "relay@example.com".to_owned(),
            password_hash: "x".to_owned(),
            nickname: None,
        })
        .await
        .unwrap()
        .id
}

fn relay_over(
    store: Arc<dyn ConversationStore>,
    upstream: Arc<MockUpstream>,
    options: RelayOptions,
) -> StreamRelay {
    StreamRelay::new(store, upstream, options)
}

async fn drain(mut rx: mpsc::Receiver<DownstreamEvent>) -> Vec<DownstreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("relay stalled")
    {
        events.push(event);
    }
    events
}

async fn messages(database: &Database, conversation_id: i64) -> Vec<Message> {
    database
        .list_messages(conversation_id, PageParams::default().normalize())
        .await
        .unwrap()
        .items
}

fn conversation_id_of(events: &[DownstreamEvent]) -> i64 {
    match events.first() {
        Some(DownstreamEvent::Start(start)) => start.conversation_id.unwrap(),
        other => panic!("expected start event, got {other:?}"),
    }
}

#[tokio::test]
async fn new_conversation_turn_persists_both_messages() {
    let database = Arc::new(create_test_database().await);
    let user_id = create_user(&database).await;
    let upstream = MockUpstream::with_script(StreamScript::events(vec![
        StreamEvent::assistant_text("Hi"),
        StreamEvent::assistant_text(" there"),
        completed(5, 2),
    ]));
    let relay = relay_over(database.clone(), upstream.clone(), RelayOptions::default());

    let rx = relay
        .stream_turn(&TurnRequest {
            user_id,
            conversation_id: 0,
            content: "Hello\nWorld".to_owned(),
        })
        .await
        .unwrap();
    let events = drain(rx).await;

    let names: Vec<&str> = events.iter().map(DownstreamEvent::name).collect();
    assert_eq!(
        names,
        [
            "start",
            "message_delta",
            "message_delta",
            "chat_completed",
            "end"
        ]
    );

    let conversation_id = conversation_id_of(&events);
    let conversation = database
        .get_conversation(conversation_id, user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conversation.title, "Hello");
    assert_eq!(conversation.external_conversation_id, "ext-conv-1");

    let stored = messages(&database, conversation_id).await;
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].role, MessageRole::User);
    assert_eq!(stored[0].content, "Hello\nWorld");
    assert_eq!(stored[1].role, MessageRole::Assistant);
    assert_eq!(stored[1].content, "Hi there");
    assert_eq!(stored[1].token_count, 7);
    assert_eq!(stored[1].external_message_id.as_deref(), Some("chat-1"));

    match events.last() {
        Some(DownstreamEvent::End(end)) => assert_eq!(end.log_id.as_deref(), Some("log-test")),
        other => panic!("expected end event, got {other:?}"),
    }
}

#[tokio::test]
async fn existing_conversation_sends_history_upstream() {
    let database = Arc::new(create_test_database().await);
    let user_id = create_user(&database).await;
    let conversation = database
        .create_conversation(user_id, "ext-existing", "Earlier")
        .await
        .unwrap();
    database
        .add_message(&NewMessage::user(conversation.id, "first question"))
        .await
        .unwrap();
    database
        .add_message(&NewMessage::assistant(conversation.id, "first answer", 3, None))
        .await
        .unwrap();

    let upstream = MockUpstream::with_script(StreamScript::events(vec![
        StreamEvent::assistant_text("second answer"),
        completed(1, 1),
    ]));
    let relay = relay_over(database.clone(), upstream.clone(), RelayOptions::default());

    let rx = relay
        .stream_turn(&TurnRequest {
            user_id,
            conversation_id: conversation.id,
            content: "second question".to_owned(),
        })
        .await
        .unwrap();
    drain(rx).await;

    let requests = upstream.chat_requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].external_conversation_id, "ext-existing");
    assert_eq!(requests[0].text, "second question");
    let history: Vec<&str> = requests[0].history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(history, ["first question", "first answer"]);

    assert_eq!(messages(&database, conversation.id).await.len(), 4);
}

#[tokio::test]
async fn history_window_limits_context() {
    let database = Arc::new(create_test_database().await);
    let user_id = create_user(&database).await;
    let conversation = database
        .create_conversation(user_id, "ext-window", "Window")
        .await
        .unwrap();
    for i in 0..5 {
        database
            .add_message(&NewMessage::user(conversation.id, format!("m{i}")))
            .await
            .unwrap();
    }

    let upstream = MockUpstream::with_script(StreamScript::default());
    let options = RelayOptions {
        history_window: 2,
        ..RelayOptions::default()
    };
    let relay = relay_over(database.clone(), upstream.clone(), options);
    let rx = relay
        .stream_turn(&TurnRequest {
            user_id,
            conversation_id: conversation.id,
            content: "next".to_owned(),
        })
        .await
        .unwrap();
    drain(rx).await;

    let requests = upstream.chat_requests.lock().unwrap().clone();
    let history: Vec<&str> = requests[0].history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(history, ["m3", "m4"]);
}

#[tokio::test]
async fn open_failure_emits_single_error_and_keeps_user_message() {
    let database = Arc::new(create_test_database().await);
    let user_id = create_user(&database).await;
    let upstream = MockUpstream::failing_open("connection refused");
    let relay = relay_over(database.clone(), upstream, RelayOptions::default());

    let rx = relay
        .stream_turn(&TurnRequest {
            user_id,
            conversation_id: 0,
            content: "Are you there?".to_owned(),
        })
        .await
        .unwrap();
    let events = drain(rx).await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].name(), "start");
    match &events[1] {
        DownstreamEvent::Error(err) => assert!(err.message.contains("connection refused")),
        other => panic!("expected error event, got {other:?}"),
    }

    let stored = messages(&database, conversation_id_of(&events)).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].role, MessageRole::User);
}

#[tokio::test]
async fn mid_stream_error_persists_nothing_and_skips_end() {
    let database = Arc::new(create_test_database().await);
    let user_id = create_user(&database).await;
    let upstream = MockUpstream::with_script(StreamScript {
        events: vec![StreamEvent::assistant_text("partial")],
        fail_with: Some("quota exceeded".to_owned()),
        hang: false,
    });
    let relay = relay_over(database.clone(), upstream, RelayOptions::default());

    let rx = relay
        .stream_turn(&TurnRequest {
            user_id,
            conversation_id: 0,
            content: "hi".to_owned(),
        })
        .await
        .unwrap();
    let events = drain(rx).await;

    let names: Vec<&str> = events.iter().map(DownstreamEvent::name).collect();
    assert_eq!(names, ["start", "message_delta", "error"]);
    assert_eq!(messages(&database, conversation_id_of(&events)).await.len(), 1);
}

#[tokio::test]
async fn chat_failed_is_terminal_and_discards_partial_reply() {
    let database = Arc::new(create_test_database().await);
    let user_id = create_user(&database).await;
    let upstream = MockUpstream::with_script(StreamScript {
        events: vec![
            StreamEvent::assistant_text("Hal"),
            StreamEvent::Failed(FailedPayload {
                code: 4000,
                message: "model overloaded".to_owned(),
            }),
        ],
        fail_with: None,
        hang: true,
    });
    let relay = relay_over(database.clone(), upstream, RelayOptions::default());

    let rx = relay
        .stream_turn(&TurnRequest {
            user_id,
            conversation_id: 0,
            content: "Hello".to_owned(),
        })
        .await
        .unwrap();
    let events = drain(rx).await;

    let names: Vec<&str> = events.iter().map(DownstreamEvent::name).collect();
    assert_eq!(names, ["start", "message_delta", "chat_failed"]);
    match &events[2] {
        DownstreamEvent::ChatFailed(failed) => {
            assert_eq!(failed.error_code, 4000);
            assert_eq!(failed.error_msg, "model overloaded");
        }
        other => panic!("expected chat_failed, got {other:?}"),
    }

    let stored = messages(&database, conversation_id_of(&events)).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].role, MessageRole::User);
}

#[tokio::test]
async fn oversized_usage_saturates_instead_of_aborting() {
    let database = Arc::new(create_test_database().await);
    let user_id = create_user(&database).await;
    let upstream = MockUpstream::with_script(StreamScript::events(vec![
        StreamEvent::assistant_text("big"),
        completed(i64::MAX, 10),
        completed(i64::MAX, i64::MAX),
    ]));
    let relay = relay_over(database.clone(), upstream, RelayOptions::default());

    let rx = relay
        .stream_turn(&TurnRequest {
            user_id,
            conversation_id: 0,
            content: "overflow".to_owned(),
        })
        .await
        .unwrap();
    let events = drain(rx).await;

    let names: Vec<&str> = events.iter().map(DownstreamEvent::name).collect();
    assert_eq!(
        names,
        ["start", "message_delta", "chat_completed", "chat_completed", "end"]
    );
    let stored = messages(&database, conversation_id_of(&events)).await;
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].content, "big");
    assert_eq!(stored[1].token_count, i64::MAX);
}

#[tokio::test]
async fn usage_sums_across_completed_events() {
    let database = Arc::new(create_test_database().await);
    let user_id = create_user(&database).await;
    let upstream = MockUpstream::with_script(StreamScript::events(vec![
        StreamEvent::assistant_text("a"),
        completed(5, 2),
        StreamEvent::assistant_text("b"),
        completed(3, 1),
    ]));
    let relay = relay_over(database.clone(), upstream, RelayOptions::default());

    let rx = relay
        .stream_turn(&TurnRequest {
            user_id,
            conversation_id: 0,
            content: "count".to_owned(),
        })
        .await
        .unwrap();
    let events = drain(rx).await;

    let stored = messages(&database, conversation_id_of(&events)).await;
    assert_eq!(stored[1].content, "ab");
    assert_eq!(stored[1].token_count, 11);
}

async fn disconnect_mid_stream(save_partial: bool) -> Vec<Message> {
    let database = Arc::new(create_test_database().await);
    let user_id = create_user(&database).await;
    let upstream = MockUpstream::with_script(StreamScript {
        events: vec![StreamEvent::assistant_text("half an ans")],
        fail_with: None,
        hang: true,
    });
    let options = RelayOptions {
        save_partial_on_disconnect: save_partial,
        ..RelayOptions::default()
    };
    let relay = relay_over(database.clone(), upstream, options);

    let mut rx = relay
        .stream_turn(&TurnRequest {
            user_id,
            conversation_id: 0,
            content: "long question".to_owned(),
        })
        .await
        .unwrap();

    let conversation_id = match rx.recv().await {
        Some(DownstreamEvent::Start(start)) => start.conversation_id.unwrap(),
        other => panic!("expected start event, got {other:?}"),
    };
    assert_eq!(rx.recv().await.map(|e| e.name()), Some("message_delta"));
    drop(rx);

    // Give the relay task time to observe the closed channel and finish
    tokio::time::sleep(Duration::from_millis(200)).await;
    messages(&database, conversation_id).await
}

#[tokio::test]
async fn disconnect_discards_partial_reply_by_default() {
    let stored = disconnect_mid_stream(false).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].role, MessageRole::User);
}

#[tokio::test]
async fn disconnect_saves_partial_reply_when_enabled() {
    let stored = disconnect_mid_stream(true).await;
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].content, "half an ans");
}

#[tokio::test]
async fn stream_deadline_reports_error() {
    let database = Arc::new(create_test_database().await);
    let user_id = create_user(&database).await;
    let upstream = MockUpstream::with_script(StreamScript {
        events: vec![StreamEvent::assistant_text("slow")],
        fail_with: None,
        hang: true,
    });
    let options = RelayOptions {
        stream_timeout: Duration::from_millis(100),
        ..RelayOptions::default()
    };
    let relay = relay_over(database.clone(), upstream, options);

    let rx = relay
        .stream_turn(&TurnRequest {
            user_id,
            conversation_id: 0,
            content: "hurry".to_owned(),
        })
        .await
        .unwrap();
    let events = drain(rx).await;

    assert_eq!(events.last().map(DownstreamEvent::name), Some("error"));
    assert_eq!(messages(&database, conversation_id_of(&events)).await.len(), 1);
}

#[tokio::test]
async fn blank_content_is_rejected_before_streaming() {
    let database = Arc::new(create_test_database().await);
    let user_id = create_user(&database).await;
    let upstream = MockUpstream::with_script(StreamScript::default());
    let relay = relay_over(database.clone(), upstream.clone(), RelayOptions::default());

    let err = relay
        .stream_turn(&TurnRequest {
            user_id,
            conversation_id: 0,
            content: "   ".to_owned(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);
    assert!(upstream.chat_requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn foreign_conversation_is_not_found() {
    let database = Arc::new(create_test_database().await);
    let owner = create_user(&database).await;
    let conversation = database
        .create_conversation(owner, "ext-owned", "Mine")
        .await
        .unwrap();
    let relay = relay_over(
        database.clone(),
        MockUpstream::with_script(StreamScript::default()),
        RelayOptions::default(),
    );

    let err = relay
        .stream_turn(&TurnRequest {
            user_id: owner + 100,
            conversation_id: conversation.id,
            content: "let me in".to_owned(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
    assert!(messages(&database, conversation.id).await.is_empty());
}

/// Store that refuses to persist assistant messages
struct AssistantRejectingStore(Arc<Database>);

#[async_trait]
impl ConversationStore for AssistantRejectingStore {
    async fn create_conversation(
        &self,
        user_id: i64,
        external_conversation_id: &str,
        title: &str,
    ) -> AppResult<Conversation> {
        self.0
            .create_conversation(user_id, external_conversation_id, title)
            .await
    }

    async fn get_conversation(
        &self,
        conversation_id: i64,
        user_id: i64,
    ) -> AppResult<Option<Conversation>> {
        self.0.get_conversation(conversation_id, user_id).await
    }

    async fn recent_messages(&self, conversation_id: i64, limit: i64) -> AppResult<Vec<Message>> {
        self.0.recent_messages(conversation_id, limit).await
    }

    async fn add_message(&self, message: &NewMessage) -> AppResult<Message> {
        if message.role == MessageRole::Assistant {
            return Err(AppError::database("disk full"));
        }
        self.0.add_message(message).await
    }
}

#[tokio::test]
async fn persist_failure_still_ends_stream() {
    let database = Arc::new(create_test_database().await);
    let user_id = create_user(&database).await;
    let upstream = MockUpstream::with_script(StreamScript::events(vec![
        StreamEvent::assistant_text("lost"),
        completed(1, 1),
    ]));
    let store = Arc::new(AssistantRejectingStore(database.clone()));
    let relay = relay_over(store, upstream, RelayOptions::default());

    let rx = relay
        .stream_turn(&TurnRequest {
            user_id,
            conversation_id: 0,
            content: "save me".to_owned(),
        })
        .await
        .unwrap();
    let events = drain(rx).await;

    assert_eq!(events.last().map(DownstreamEvent::name), Some("end"));
    assert_eq!(messages(&database, conversation_id_of(&events)).await.len(), 1);
}

#[tokio::test]
async fn send_message_persists_reply() {
    let database = Arc::new(create_test_database().await);
    let user_id = create_user(&database).await;
    let relay = relay_over(
        database.clone(),
        MockUpstream::with_script(StreamScript::default()),
        RelayOptions::default(),
    );

    let reply = relay
        .send_message(&TurnRequest {
            user_id,
            conversation_id: 0,
            content: "ping".to_owned(),
        })
        .await
        .unwrap();

    assert_eq!(reply.assistant_message.content, "echo: ping");
    assert_eq!(reply.assistant_message.token_count, 7);
    assert_eq!(messages(&database, reply.conversation.id).await.len(), 2);
}

#[tokio::test]
async fn workflow_stream_relays_without_persisting() {
    let upstream = MockUpstream::with_script(StreamScript::events(vec![
        StreamEvent::assistant_text("step 1"),
        StreamEvent::assistant_text("step 2"),
    ]));
    let database = Arc::new(create_test_database().await);
    let relay = relay_over(database, upstream.clone(), RelayOptions::default());

    let events = drain(relay.stream_workflow(coze_gateway::upstream::WorkflowInput::text(
        "run it",
        serde_json::Map::new(),
    )))
    .await;

    let names: Vec<&str> = events.iter().map(DownstreamEvent::name).collect();
    assert_eq!(names, ["start", "message_delta", "message_delta", "end"]);
    assert_eq!(upstream.workflow_inputs.lock().unwrap().len(), 1);
}
