// ABOUTME: Line-buffering SSE (Server-Sent Events) frame parser for upstream streaming responses
// ABOUTME: Collects event names and data lines across TCP chunk boundaries into whole frames
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # SSE Frame Parser
//!
//! The upstream agent API tags every frame with an `event:` line, so unlike a
//! data-only parser this one keeps the event name next to the payload:
//!
//! ```text
//! event:conversation.message.delta
//! data:{"content":"Hi","role":"assistant",...}
//!
//! ```
//!
//! Framing rules follow the SSE format: a blank line dispatches the pending
//! frame, several `data:` lines are joined with `\n`, one optional space after
//! the colon is stripped, comment lines (`:`) and `id:`/`retry:` are ignored.
//! Network chunks may split a line anywhere; partial lines stay buffered until
//! their newline arrives. Each byte is scanned for a newline once, and a
//! partial line or pending frame larger than [`MAX_SSE_FRAME_BYTES`] fails the
//! stream instead of growing the buffer without bound.

use std::collections::VecDeque;
use std::mem;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::stream::unfold;
use futures_util::{Stream, StreamExt};

use crate::constants::upstream::{MAX_SSE_FRAME_BYTES, SERVICE_NAME};
use crate::errors::{AppError, AppResult};

/// One dispatched SSE frame
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    /// Value of the `event:` field, if present
    pub event: Option<String>,
    /// Joined `data:` lines
    pub data: String,
}

impl SseFrame {
    /// Event name, or `message` when the frame carried none
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Line-buffering SSE parser that handles partial lines across chunk boundaries
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    /// Bytes not yet terminated by a newline
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no newline
    scanned: usize,
    /// Fields collected since the last blank line
    event: Option<String>,
    data: Vec<String>,
    data_bytes: usize,
}

impl SseLineBuffer {
    /// Create a new empty line buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every frame completed by them
    ///
    /// # Errors
    ///
    /// Returns an upstream protocol error when a line or frame outgrows
    /// [`MAX_SSE_FRAME_BYTES`]; the parser is reset and should not be fed again.
    pub fn feed(&mut self, bytes: &[u8]) -> AppResult<Vec<SseFrame>> {
        let mut buffer = mem::take(&mut self.buffer);
        buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        let mut start = 0;
        let mut cursor = self.scanned;
        while let Some(offset) = buffer[cursor..].iter().position(|b| *b == b'\n') {
            let end = cursor + offset;
            // Decode per whole line so multi-byte characters split across chunks survive
            let line = String::from_utf8_lossy(&buffer[start..end]);
            if let Some(frame) = self.process_line(line.trim_end_matches('\r')) {
                frames.push(frame);
            }
            start = end + 1;
            cursor = start;
        }
        buffer.drain(..start);
        self.scanned = buffer.len();
        self.buffer = buffer;

        if self.buffer.len() > MAX_SSE_FRAME_BYTES || self.data_bytes > MAX_SSE_FRAME_BYTES {
            *self = Self::default();
            return Err(AppError::upstream_protocol(format!(
                "{SERVICE_NAME} stream frame exceeds {MAX_SSE_FRAME_BYTES} bytes"
            )));
        }
        Ok(frames)
    }

    /// Flush the trailing partial line and any pending frame at end of input
    pub fn flush(&mut self) -> Option<SseFrame> {
        let remaining = mem::take(&mut self.buffer);
        self.scanned = 0;
        let line = String::from_utf8_lossy(&remaining);
        let line = line.trim_end_matches('\r');
        if !line.is_empty() {
            if let Some(frame) = self.process_line(line) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => {
                self.data_bytes += value.len();
                self.data.push(value.to_owned());
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() && event.is_none() {
            return None;
        }
        self.data_bytes = 0;
        let data = mem::take(&mut self.data).join("\n");
        Some(SseFrame { event, data })
    }
}

/// Boxed stream of parsed frames
pub type FrameStream = Pin<Box<dyn Stream<Item = AppResult<SseFrame>> + Send>>;

struct FrameState {
    parser: SseLineBuffer,
    pending: VecDeque<AppResult<SseFrame>>,
    ended: bool,
}

/// Turn a raw byte stream into a stream of SSE frames
///
/// A transport error is yielded once as an upstream-unavailable error and
/// ends the stream; an oversized frame ends it with a protocol error.
pub fn frame_stream<S, E>(byte_stream: S) -> FrameStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = FrameState {
        parser: SseLineBuffer::new(),
        pending: VecDeque::new(),
        ended: false,
    };

    let stream = unfold(
        (Box::pin(byte_stream), state),
        |(mut bytes, mut state)| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, (bytes, state)));
                }
                if state.ended {
                    return None;
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => match state.parser.feed(&chunk) {
                        Ok(frames) => state.pending.extend(frames.into_iter().map(Ok)),
                        Err(e) => {
                            state.ended = true;
                            state.pending.push_back(Err(e));
                        }
                    },
                    Some(Err(e)) => {
                        state.ended = true;
                        state.pending.push_back(Err(AppError::upstream_unavailable(format!(
                            "{SERVICE_NAME} stream read error: {e}"
                        ))));
                    }
                    None => {
                        state.ended = true;
                        state.pending.extend(state.parser.flush().map(Ok));
                    }
                }
            }
        },
    );

    Box::pin(stream)
}
