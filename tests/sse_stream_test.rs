// ABOUTME: Tests for SSE framing and event normalization over chunked byte streams
// ABOUTME: Covers split lines, split UTF-8, CRLF endings, transport errors, and stream termination
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use bytes::Bytes;
use coze_gateway::constants::upstream::MAX_SSE_FRAME_BYTES;
use coze_gateway::errors::ErrorCode;
use coze_gateway::upstream::events::{normalize_chat_frame, normalized_events};
use coze_gateway::upstream::sse_parser::{frame_stream, SseFrame, SseLineBuffer};
use coze_gateway::upstream::{StreamEvent, StreamEventKind};
use futures_util::stream::{self, StreamExt};

fn chunks(parts: &[&[u8]]) -> impl futures_util::Stream<Item = Result<Bytes, String>> + Send {
    let owned: Vec<Result<Bytes, String>> = parts
        .iter()
        .map(|p| Ok(Bytes::copy_from_slice(p)))
        .collect();
    stream::iter(owned)
}

#[test]
fn partial_lines_wait_for_their_newline() {
    let mut parser = SseLineBuffer::new();
    assert!(parser.feed(b"event: conversation.mess").unwrap().is_empty());
    assert!(parser.feed(b"age.delta\ndata: {\"content\":").unwrap().is_empty());
    let frames = parser.feed(b"\"Hi\"}\n\n").unwrap();

    assert_eq!(
        frames,
        [SseFrame {
            event: Some("conversation.message.delta".to_owned()),
            data: "{\"content\":\"Hi\"}".to_owned(),
        }]
    );
}

#[test]
fn crlf_endings_and_comments_are_handled() {
    let mut parser = SseLineBuffer::new();
    let frames = parser
        .feed(b": keep-alive\r\nevent: done\r\ndata: [DONE]\r\n\r\n")
        .unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].event_name(), "done");
    assert_eq!(frames[0].data, "[DONE]");
}

#[test]
fn frame_without_event_defaults_to_message() {
    let mut parser = SseLineBuffer::new();
    let frames = parser.feed(b"data: hello\n\n").unwrap();
    assert_eq!(frames[0].event_name(), "message");
}

#[test]
fn trailing_frame_is_flushed_at_end_of_input() {
    let mut parser = SseLineBuffer::new();
    assert!(parser.feed(b"event: done\ndata: {}").unwrap().is_empty());
    let frame = parser.flush().expect("pending frame");
    assert_eq!(frame.event_name(), "done");
    assert_eq!(frame.data, "{}");
}

#[test]
fn long_line_trickled_in_small_chunks_is_reassembled() {
    let payload = "x".repeat(64 * 1024);
    let body = format!("event: conversation.message.delta\ndata: {payload}\n\n");
    let mut parser = SseLineBuffer::new();
    let mut frames = Vec::new();
    for chunk in body.as_bytes().chunks(7) {
        frames.extend(parser.feed(chunk).unwrap());
    }

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].data.len(), payload.len());
}

#[test]
fn unterminated_oversized_line_is_rejected() {
    let mut parser = SseLineBuffer::new();
    parser.feed(b"data: ").unwrap();
    let filler = vec![b'a'; 64 * 1024];
    let mut fed = 0;
    let err = loop {
        match parser.feed(&filler) {
            Ok(frames) => assert!(frames.is_empty()),
            Err(e) => break e,
        }
        fed += filler.len();
        assert!(fed <= MAX_SSE_FRAME_BYTES + filler.len(), "buffer grew past the cap");
    };
    assert_eq!(err.code, ErrorCode::UpstreamProtocolError);
}

#[tokio::test]
async fn oversized_frame_ends_the_frame_stream() {
    let line = vec![b'd'; MAX_SSE_FRAME_BYTES];
    let parts: Vec<Result<Bytes, String>> = vec![
        Ok(Bytes::from_static(b"event: ping\ndata: {}\n\ndata: ")),
        Ok(Bytes::from(line)),
        Ok(Bytes::from_static(b"\n\nevent: never\ndata: {}\n\n")),
    ];
    let items: Vec<_> = frame_stream(stream::iter(parts)).collect().await;

    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    let err = items[1].as_ref().unwrap_err();
    assert_eq!(err.code, ErrorCode::UpstreamProtocolError);
}

#[tokio::test]
async fn multibyte_characters_split_across_chunks_survive() {
    let text = "event: conversation.message.delta\ndata: {\"content\":\"你好\"}\n\n".as_bytes();
    // Split inside the first CJK character
    let split = text.iter().position(|b| *b > 0x7f).unwrap() + 1;
    let frames: Vec<SseFrame> = frame_stream(chunks(&[&text[..split], &text[split..]]))
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].data, "{\"content\":\"你好\"}");
}

#[tokio::test]
async fn transport_error_ends_the_frame_stream() {
    let parts: Vec<Result<Bytes, String>> = vec![
        Ok(Bytes::from_static(b"event: ping\ndata: {}\n\n")),
        Err("connection reset".to_owned()),
        Ok(Bytes::from_static(b"event: never\ndata: {}\n\n")),
    ];
    let items: Vec<_> = frame_stream(stream::iter(parts)).collect().await;

    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    let err = items[1].as_ref().unwrap_err();
    assert_eq!(err.code, ErrorCode::ExternalServiceUnavailable);
    assert!(err.message.contains("connection reset"));
}

#[tokio::test]
async fn normalized_stream_stops_at_done() {
    let body: &[&[u8]] = &[
        b"event: conversation.message.delta\ndata: {\"role\":\"assistant\",\"type\":\"answer\",\"content\":\"A\",\"content_type\":\"text\"}\n\n",
        b"event: done\ndata: \"[DONE]\"\n\n",
        b"event: conversation.message.delta\ndata: {\"content\":\"late\"}\n\n",
    ];
    let events: Vec<StreamEvent> = normalized_events(frame_stream(chunks(body)), normalize_chat_frame)
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(events, [StreamEvent::assistant_text("A")]);
}

#[tokio::test]
async fn in_stream_error_event_ends_stream_with_error() {
    let body: &[&[u8]] = &[
        b"event: conversation.message.delta\ndata: {\"content\":\"A\"}\n\n",
        b"event: error\ndata: {\"code\":4000,\"msg\":\"quota exceeded\"}\n\n",
        b"event: conversation.message.delta\ndata: {\"content\":\"B\"}\n\n",
    ];
    let items: Vec<_> = normalized_events(frame_stream(chunks(body)), normalize_chat_frame)
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert_eq!(
        items[0].as_ref().map(StreamEvent::kind).ok(),
        Some(StreamEventKind::Delta)
    );
    let err = items[1].as_ref().unwrap_err();
    assert!(err.message.contains("quota exceeded"));
}

#[tokio::test]
async fn unknown_events_pass_through_verbatim() {
    let body: &[&[u8]] = &[b"event: conversation.audio.delta\ndata: {\"x\":1}\n\n"];
    let events: Vec<StreamEvent> = normalized_events(frame_stream(chunks(body)), normalize_chat_frame)
        .map(Result::unwrap)
        .collect()
        .await;

    match &events[..] {
        [StreamEvent::Other(other)] => {
            assert_eq!(other.event, "conversation.audio.delta");
            assert_eq!(other.raw, "{\"x\":1}");
        }
        other => panic!("expected one passthrough event, got {other:?}"),
    }
}
