// ABOUTME: SSE (Server-Sent Events) line-buffering parser for assistant run streams
// ABOUTME: Handles partial lines across TCP boundaries, multiple events per chunk, and named event types
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # SSE Stream Parser
//!
//! Run streams are framed as named events:
//!
//! ```text
//! event: thread.message.delta
//! data: {"id":"msg_1","delta":{"content":[{"type":"text","text":{"value":"Hi"}}]}}
//!
//! event: done
//! data: [DONE]
//! ```
//!
//! Network chunks do not align with event boundaries, so complete lines are
//! buffered here and each `data:` line is emitted together with the most
//! recent `event:` name of the same block. The caller supplies a
//! `parse_event` closure that maps `(event, data)` to a [`RunEvent`].

use std::collections::VecDeque;
use std::mem;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::stream::unfold;
use futures_util::{Stream, StreamExt};

use super::{RunEvent, RunEventStream};
use crate::errors::{AppError, AppResult};

/// A parsed SSE event from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data:` payload with the event name of its block, if any
    Message {
        /// Value of the preceding `event:` field
        event: Option<String>,
        /// Payload with the `data:` prefix stripped
        data: String,
    },
    /// The `[DONE]` termination signal
    Done,
}

/// Line-buffering SSE parser that handles partial lines across TCP chunk boundaries
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    /// Raw bytes not yet terminated by a newline
    buffer: Vec<u8>,
    /// `event:` name of the block being read
    current_event: Option<String>,
}

impl SseLineBuffer {
    /// Create a new empty line buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from a TCP chunk, returning any complete SSE events
    ///
    /// Lines are decoded only once complete, so a multi-byte character split
    /// across chunks is reassembled before UTF-8 decoding.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&raw[..newline_pos]);
            if let Some(event) = self.parse_line(line.trim_end_matches('\r')) {
                events.push(event);
            }
        }
        events
    }

    /// Flush any remaining buffered content when the byte stream ends
    pub fn flush(&mut self) -> Vec<SseEvent> {
        let remaining = mem::take(&mut self.buffer);
        let text = String::from_utf8_lossy(&remaining);
        let line = text.trim_end_matches(['\r', '\n']);
        self.parse_line(line).into_iter().collect()
    }

    fn parse_line(&mut self, line: &str) -> Option<SseEvent> {
        // Blank line closes the current event block
        if line.trim().is_empty() {
            self.current_event = None;
            return None;
        }

        if let Some(name) = field_value(line, "event") {
            self.current_event = Some(name.to_owned());
            return None;
        }

        // id:, retry:, and comment lines are ignored
        let data = field_value(line, "data")?;
        if data == "[DONE]" {
            return Some(SseEvent::Done);
        }
        if data.trim().is_empty() {
            return None;
        }

        Some(SseEvent::Message {
            event: self.current_event.clone(),
            data: data.to_owned(),
        })
    }
}

/// Value of an SSE field line, with the single optional leading space removed
fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(field)?.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Internal state for the SSE stream unfold
struct SseStreamState<F> {
    parser: SseLineBuffer,
    pending: VecDeque<AppResult<RunEvent>>,
    stream_ended: bool,
    parse_event: F,
    service_name: &'static str,
}

impl<F> SseStreamState<F>
where
    F: Fn(Option<&str>, &str) -> Option<AppResult<RunEvent>>,
{
    fn push_events(&mut self, events: Vec<SseEvent>) {
        for event in events {
            if self.stream_ended {
                break;
            }
            match event {
                SseEvent::Message { event, data } => {
                    if let Some(result) = (self.parse_event)(event.as_deref(), &data) {
                        self.pending.push_back(result);
                    }
                }
                SseEvent::Done => self.stream_ended = true,
            }
        }
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Create a properly-buffered run event stream from a raw byte stream
///
/// * `byte_stream` - Raw bytes from `response.bytes_stream()`
/// * `parse_event` - Maps `(event name, data)` to a run event; `None` skips the event
/// * `service_name` - Used in error messages
pub fn create_run_event_stream<S, F>(
    byte_stream: S,
    parse_event: F,
    service_name: &'static str,
) -> RunEventStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    F: Fn(Option<&str>, &str) -> Option<AppResult<RunEvent>> + Send + 'static,
{
    let state = SseStreamState {
        parser: SseLineBuffer::new(),
        pending: VecDeque::new(),
        stream_ended: false,
        parse_event,
        service_name,
    };

    let stream = unfold(
        (Box::pin(byte_stream) as ByteStream, state),
        |(mut byte_stream, mut state)| async move {
            loop {
                // Drain pending events first (multiple SSE events per TCP chunk)
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, (byte_stream, state)));
                }

                if state.stream_ended {
                    return None;
                }

                match byte_stream.next().await {
                    Some(Ok(bytes)) => {
                        let events = state.parser.feed(&bytes);
                        state.push_events(events);
                    }
                    Some(Err(e)) => {
                        state.stream_ended = true;
                        let error = AppError::external_service(
                            state.service_name,
                            format!("Stream read error: {e}"),
                        );
                        return Some((Err(error), (byte_stream, state)));
                    }
                    None => {
                        let events = state.parser.flush();
                        state.push_events(events);
                        state.stream_ended = true;
                    }
                }
            }
        },
    );

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name_is_attached_to_data() {
        let mut parser = SseLineBuffer::new();
        let events = parser.feed(b"event: thread.run.completed\ndata: {\"id\":\"run_1\"}\n\n");
        assert_eq!(
            events,
            vec![SseEvent::Message {
                event: Some("thread.run.completed".to_owned()),
                data: "{\"id\":\"run_1\"}".to_owned(),
            }]
        );
    }

    #[test]
    fn test_blank_line_resets_event_name() {
        let mut parser = SseLineBuffer::new();
        let events = parser.feed(b"event: a\ndata: 1\n\ndata: 2\n");
        assert_eq!(
            events,
            vec![
                SseEvent::Message {
                    event: Some("a".to_owned()),
                    data: "1".to_owned()
                },
                SseEvent::Message {
                    event: None,
                    data: "2".to_owned()
                },
            ]
        );
    }

    #[test]
    fn test_partial_line_waits_for_newline() {
        let mut parser = SseLineBuffer::new();
        assert!(parser.feed(b"event: x\ndata: {\"par").is_empty());
        let events = parser.feed(b"tial\":true}\n");
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let line = "data: Da dầu\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xE1).unwrap() + 1;
        let mut parser = SseLineBuffer::new();
        assert!(parser.feed(&line[..split]).is_empty());
        assert_eq!(
            parser.feed(&line[split..]),
            vec![SseEvent::Message {
                event: None,
                data: "Da dầu".to_owned()
            }]
        );
    }

    #[test]
    fn test_done_and_flush() {
        let mut parser = SseLineBuffer::new();
        assert_eq!(parser.feed(b"data: [DONE]\n"), vec![SseEvent::Done]);
        assert!(parser.feed(b"data:no-space").is_empty());
        assert_eq!(
            parser.flush(),
            vec![SseEvent::Message {
                event: None,
                data: "no-space".to_owned()
            }]
        );
    }
}
