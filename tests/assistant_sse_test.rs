// ABOUTME: Integration tests for decoding assistant run streams from raw SSE bytes
// ABOUTME: Feeds chunked byte streams through the line buffer and the run event mapping
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use bytes::Bytes;
use futures_util::{stream, StreamExt};
use skincare_assistant::{
    assistant::{
        openai::parse_assistant_event,
        sse_parser::{create_run_event_stream, SseEvent, SseLineBuffer},
        RunEvent,
    },
    errors::{AppResult, ErrorCode},
};

const RUN_TRANSCRIPT: &str = concat!(
    "event: thread.run.created\n",
    "data: {\"id\":\"run_1\",\"status\":\"queued\"}\n\n",
    "event: thread.message.delta\n",
    "data: {\"id\":\"msg_1\",\"delta\":{\"content\":[{\"index\":0,\"type\":\"text\",\"text\":{\"value\":\"Use a \"}}]}}\n\n",
    "event: thread.message.delta\n",
    "data: {\"id\":\"msg_1\",\"delta\":{\"content\":[{\"index\":0,\"type\":\"text\",\"text\":{\"value\":\"gentle cleanser\"}}]}}\n\n",
    "event: thread.message.completed\n",
    "data: {\"id\":\"msg_1\",\"role\":\"assistant\",\"run_id\":\"run_1\",\"content\":[]}\n\n",
    "event: thread.run.completed\n",
    "data: {\"id\":\"run_1\",\"status\":\"completed\"}\n\n",
    "event: done\n",
    "data: [DONE]\n\n",
);

/// Split `text` into chunks of `size` bytes regardless of line boundaries
fn chunked(text: &str, size: usize) -> Vec<Bytes> {
    text.as_bytes()
        .chunks(size)
        .map(Bytes::copy_from_slice)
        .collect()
}

async fn decode(chunks: Vec<Bytes>) -> Vec<AppResult<RunEvent>> {
    let bytes = stream::iter(chunks.into_iter().map(Ok::<Bytes, reqwest::Error>));
    create_run_event_stream(bytes, parse_assistant_event, "test-assistant")
        .collect()
        .await
}

#[tokio::test]
async fn test_run_stream_survives_arbitrary_chunking() {
    for size in [1, 7, 64, RUN_TRANSCRIPT.len()] {
        let events: Vec<RunEvent> = decode(chunked(RUN_TRANSCRIPT, size))
            .await
            .into_iter()
            .collect::<AppResult<_>>()
            .unwrap();

        assert_eq!(
            events,
            vec![
                RunEvent::TextDelta("Use a ".to_owned()),
                RunEvent::TextDelta("gentle cleanser".to_owned()),
                RunEvent::MessageCompleted {
                    message_id: "msg_1".to_owned()
                },
                RunEvent::RunCompleted,
            ],
            "chunk size {size}"
        );
    }
}

#[tokio::test]
async fn test_events_after_done_are_ignored() {
    let transcript = format!(
        "{RUN_TRANSCRIPT}event: thread.message.delta\ndata: {{\"delta\":{{\"content\":[{{\"type\":\"text\",\"text\":{{\"value\":\"late\"}}}}]}}}}\n\n"
    );
    let events = decode(chunked(&transcript, 32)).await;
    assert_eq!(events.len(), 4);
}

#[tokio::test]
async fn test_failed_run_carries_reason() {
    let transcript = concat!(
        "event: thread.message.delta\n",
        "data: {\"delta\":{\"content\":[{\"type\":\"text\",\"text\":{\"value\":\"Hi\"}}]}}\n\n",
        "event: thread.run.failed\n",
        "data: {\"id\":\"run_1\",\"status\":\"failed\",\"last_error\":{\"code\":\"rate_limit_exceeded\",\"message\":\"Slow down\"}}\n\n",
    );

    let events: Vec<RunEvent> = decode(chunked(transcript, 16))
        .await
        .into_iter()
        .collect::<AppResult<_>>()
        .unwrap();

    assert_eq!(
        events,
        vec![
            RunEvent::TextDelta("Hi".to_owned()),
            RunEvent::RunFailed {
                reason: "rate_limit_exceeded: Slow down".to_owned()
            },
        ]
    );
}

#[test]
fn test_terminal_event_without_detail_uses_event_name() {
    let event = parse_assistant_event(Some("thread.run.expired"), "{}")
        .unwrap()
        .unwrap();
    assert_eq!(
        event,
        RunEvent::RunFailed {
            reason: "expired".to_owned()
        }
    );
}

#[test]
fn test_error_event_is_a_send_failure() {
    let err = parse_assistant_event(Some("error"), "{\"message\":\"server overloaded\"}")
        .unwrap()
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::MessageSendFailed);
    assert!(err.message.contains("server overloaded"));
}

#[test]
fn test_unknown_and_unnamed_events_are_skipped() {
    assert!(parse_assistant_event(Some("thread.run.step.created"), "{}").is_none());
    assert!(parse_assistant_event(None, "{\"delta\":{}}").is_none());
}

#[test]
fn test_line_buffer_keeps_event_name_per_block() {
    let mut buffer = SseLineBuffer::new();
    let mut events = buffer.feed(b"event: thread.run.completed\r\ndata: {}\r\n\r\ndata: {\"x\":1}");
    events.extend(buffer.flush());

    assert_eq!(
        events,
        vec![
            SseEvent::Message {
                event: Some("thread.run.completed".to_owned()),
                data: "{}".to_owned(),
            },
            SseEvent::Message {
                event: None,
                data: "{\"x\":1}".to_owned(),
            },
        ]
    );
}

#[tokio::test]
async fn test_non_ascii_delta_split_mid_character() {
    let transcript = concat!(
        "event: thread.message.delta\n",
        "data: {\"delta\":{\"content\":[{\"type\":\"text\",\"text\":{\"value\":\"Da dầu nên dùng sữa rửa mặt dịu nhẹ\"}}]}}\n\n",
        "data: [DONE]\n\n",
    );

    // Small chunk sizes cut through multi-byte characters
    for size in [1, 2, 3, 5] {
        let events: Vec<RunEvent> = decode(chunked(transcript, size))
            .await
            .into_iter()
            .collect::<AppResult<_>>()
            .unwrap();
        assert_eq!(
            events,
            vec![RunEvent::TextDelta(
                "Da dầu nên dùng sữa rửa mặt dịu nhẹ".to_owned()
            )],
            "chunk size {size}"
        );
    }

    let bytes = transcript.as_bytes();
    let split = bytes.iter().position(|&b| b == 0xE1).unwrap() + 1;
    let events = decode(vec![
        Bytes::copy_from_slice(&bytes[..split]),
        Bytes::copy_from_slice(&bytes[split..]),
    ])
    .await;
    assert_eq!(
        events[0].as_ref().unwrap(),
        &RunEvent::TextDelta("Da dầu nên dùng sữa rửa mặt dịu nhẹ".to_owned())
    );
}
