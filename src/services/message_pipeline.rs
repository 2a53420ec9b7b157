// ABOUTME: Message pipeline turning one user message into a persisted exchange with a live reply stream
// ABOUTME: A producer task consumes the run stream, forwards fragments over a channel, and finalizes the reply
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Message Pipeline
//!
//! `send_message` validates, enriches, submits, and starts a streamed run,
//! then hands the caller a [`PipelineStream`]. Everything after that runs in
//! a dedicated producer task:
//!
//! ```text
//! RunEventStream ──► producer task ──► mpsc (bounded) ──► caller
//!                        │
//!                        └─► accumulated text ──► assistant message record
//! ```
//!
//! The assistant record is created on the first fragment and rewritten with
//! the accumulated text every `REPLY_FLUSH_FRAGMENTS` fragments, so history
//! read mid-stream lags the caller by at most that many fragments.
//!
//! The caller going away only stops forwarding. The producer keeps reading
//! the run until it ends so the reply is still persisted.
//!
//! One thread is assumed to carry at most one in-flight send at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::file_reconciliation::FileReconciler;
use super::thread_lifecycle::ThreadLifecycle;
use super::usage_limiter::UsageLimiter;
use crate::assistant::{AssistantClient, RunEvent, RunEventStream};
use crate::config::PipelineConfig;
use crate::constants::pipeline::{
    LOCAL_MESSAGE_ID_PREFIX, MAX_TITLE_CHARS, REPLY_FLUSH_FRAGMENTS, STREAM_CHANNEL_CAPACITY,
};
use crate::database::{MessageManager, MessageRecord};
use crate::enrichment::ProfileEnricher;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::{AttachmentReference, Message, MessageContent, Sender, Thread};

const TITLE_SYSTEM_PROMPT: &str = "Summarize the conversation topic as a short title of at most six words. \
Reply with the title only, without quotes or punctuation at the end.";

/// Event delivered to the caller of [`MessagePipeline::send_message`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// The user message was accepted and stored
    UserMessage {
        /// Local message id
        message_id: String,
        /// External message id
        external_message_id: String,
    },
    /// A fragment of the assistant reply
    Delta {
        /// Fragment text
        text: String,
    },
    /// The run ended and the reply was stored
    Done {
        /// Local id of the assistant message, absent if storing it failed
        message_id: Option<String>,
        /// External id, or a local placeholder when none was reported
        external_message_id: String,
        /// Whether an external id was captured
        complete: bool,
    },
    /// The run failed after streaming began
    Error {
        /// Reason code
        code: ErrorCode,
        /// Human readable detail
        message: String,
    },
}

/// Live reply stream handed to the caller
pub type PipelineStream = ReceiverStream<PipelineEvent>;

/// Counters for pipeline outcomes that are not visible to callers
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    completed: AtomicU64,
    degraded: AtomicU64,
}

impl PipelineMetrics {
    /// Replies persisted without error
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Replies whose local persistence failed after streaming
    #[must_use]
    pub fn degraded(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }

    fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_degraded(&self) {
        self.degraded.fetch_add(1, Ordering::Relaxed);
    }
}

/// Assistant text gathered while the run streams
#[derive(Debug, Default)]
struct ReplyBuffer {
    text: String,
    record_id: Option<String>,
    external_message_id: Option<String>,
    unflushed_fragments: usize,
}

/// Sends messages to a thread and persists both sides of the exchange
#[derive(Clone)]
pub struct MessagePipeline {
    assistant: Arc<dyn AssistantClient>,
    lifecycle: ThreadLifecycle,
    limiter: Arc<UsageLimiter>,
    enricher: Arc<dyn ProfileEnricher>,
    files: FileReconciler,
    messages: MessageManager,
    config: PipelineConfig,
    metrics: Arc<PipelineMetrics>,
}

impl MessagePipeline {
    /// Create the pipeline from its collaborators
    #[must_use]
    pub fn new(
        assistant: Arc<dyn AssistantClient>,
        lifecycle: ThreadLifecycle,
        limiter: Arc<UsageLimiter>,
        enricher: Arc<dyn ProfileEnricher>,
        files: FileReconciler,
        messages: MessageManager,
        config: PipelineConfig,
    ) -> Self {
        Self {
            assistant,
            lifecycle,
            limiter,
            enricher,
            files,
            messages,
            config,
            metrics: Arc::new(PipelineMetrics::default()),
        }
    }

    /// Outcome counters
    #[must_use]
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Send `content` to the thread and stream the assistant reply
    ///
    /// The first event is always [`PipelineEvent::UserMessage`]; the last is
    /// [`PipelineEvent::Done`], sent once the reply has been stored.
    ///
    /// # Errors
    ///
    /// Returns `InvalidThreadId`, `ThreadNotFound`, `ThreadPermissionDenied`,
    /// or `DailyLimitExceeded` before any external call, and
    /// `MessageSendFailed` when submitting or starting the run fails
    pub async fn send_message(
        &self,
        thread_id: &str,
        user_id: &str,
        content: MessageContent,
    ) -> AppResult<PipelineStream> {
        if content.is_empty() {
            return Err(AppError::invalid_input("Message content must not be empty"));
        }

        let thread = self.lifecycle.authorize(thread_id, user_id).await?;
        let count = self.limiter.authorize(user_id).await?;
        debug!(thread_id, user_id, usage = count, "Message accepted");

        let outgoing = self.enrich(user_id, &content).await;

        let remote = self
            .assistant
            .create_message(&thread.external_thread_id, &outgoing)
            .await
            .map_err(send_failed)?;

        // Local history keeps what the user wrote, not the enriched form
        let user_message = self
            .messages
            .insert_message(&thread.id, Sender::User, &content, Some(&remote.id), true)
            .await?;

        self.files
            .link_message_attachments(&user_message.id, &content)
            .await;

        let events = self
            .assistant
            .stream_run(&thread.external_thread_id)
            .await
            .map_err(send_failed)?;

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let first = PipelineEvent::UserMessage {
            message_id: user_message.id.clone(),
            external_message_id: remote.id,
        };

        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline
                .produce(thread, content.text(), first, events, tx)
                .await;
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Messages of a thread owned by `user_id`, oldest first, with attachments
    ///
    /// # Errors
    ///
    /// Returns ownership errors or a store error
    pub async fn list_messages(&self, thread_id: &str, user_id: &str) -> AppResult<Vec<Message>> {
        self.lifecycle.authorize(thread_id, user_id).await?;

        let records = self.messages.list_messages(thread_id).await?;
        let mut attachments = self.files.find_by_thread(thread_id).await?;
        records
            .into_iter()
            .map(|record| {
                let linked = attachments.remove(&record.id).unwrap_or_default();
                to_message(record, linked)
            })
            .collect()
    }

    /// Content to send: enriched when the enricher answers in time, original otherwise
    async fn enrich(&self, user_id: &str, content: &MessageContent) -> MessageContent {
        let budget = self.config.enrichment_timeout();
        match tokio::time::timeout(budget, self.enricher.enrich(user_id, content)).await {
            Ok(Ok(enriched)) => enriched,
            Ok(Err(e)) => {
                warn!(user_id, error = %e, "Profile enrichment failed; sending original content");
                content.clone()
            }
            Err(_) => {
                warn!(
                    user_id,
                    timeout_ms = self.config.enrichment_timeout_ms,
                    "Profile enrichment timed out; sending original content"
                );
                content.clone()
            }
        }
    }

    /// Producer task body: consume the run, forward fragments, then finalize
    async fn produce(
        self,
        thread: Thread,
        user_text: String,
        first: PipelineEvent,
        mut events: RunEventStream,
        tx: mpsc::Sender<PipelineEvent>,
    ) {
        let mut forwarder = Forwarder::new(tx);
        forwarder.send(first).await;

        let mut reply = ReplyBuffer::default();
        while let Some(event) = events.next().await {
            match event {
                Ok(RunEvent::TextDelta(text)) => {
                    reply.text.push_str(&text);
                    reply.unflushed_fragments += 1;
                    if reply.record_id.is_none() {
                        self.open_reply(&thread.id, &mut reply).await;
                    } else if reply.unflushed_fragments >= REPLY_FLUSH_FRAGMENTS {
                        self.flush_reply(&mut reply).await;
                    }
                    forwarder.send(PipelineEvent::Delta { text }).await;
                }
                Ok(RunEvent::MessageCompleted { message_id }) => {
                    reply.external_message_id = Some(message_id);
                }
                Ok(RunEvent::RunCompleted) => break,
                Ok(RunEvent::RunFailed { reason }) => {
                    warn!(thread_id = %thread.id, reason = %reason, "Run failed while streaming");
                    forwarder
                        .send(PipelineEvent::Error {
                            code: ErrorCode::MessageSendFailed,
                            message: reason,
                        })
                        .await;
                    break;
                }
                Err(e) => {
                    warn!(thread_id = %thread.id, error = %e, "Run stream broke");
                    forwarder
                        .send(PipelineEvent::Error {
                            code: ErrorCode::MessageSendFailed,
                            message: e.message,
                        })
                        .await;
                    break;
                }
            }
        }

        let (done, reply_text) = self.finalize(&thread.id, reply).await;
        forwarder.send(done).await;
        drop(forwarder);

        if thread.name.is_none() && self.config.auto_name_threads && !reply_text.is_empty() {
            spawn_auto_name(
                Arc::clone(&self.assistant),
                self.lifecycle.clone(),
                thread.id,
                user_text,
                reply_text,
            );
        }
    }

    /// Create the incomplete assistant record on the first fragment
    async fn open_reply(&self, thread_id: &str, reply: &mut ReplyBuffer) {
        let content = MessageContent::Text(reply.text.clone());
        match self
            .messages
            .insert_message(thread_id, Sender::Assistant, &content, None, false)
            .await
        {
            Ok(record) => {
                reply.record_id = Some(record.id);
                reply.unflushed_fragments = 0;
            }
            Err(e) => {
                // Finalize retries with an insert
                warn!(thread_id, error = %e, "Failed to open assistant message");
            }
        }
    }

    /// Rewrite the open assistant record with the text accumulated so far
    async fn flush_reply(&self, reply: &mut ReplyBuffer) {
        let Some(record_id) = reply.record_id.as_deref() else {
            return;
        };
        reply.unflushed_fragments = 0;
        if let Err(e) = self
            .messages
            .update_assistant_message(record_id, &reply.text, None, false)
            .await
        {
            debug!(message_id = record_id, error = %e, "Failed to flush partial reply");
        }
    }

    /// Persist the accumulated reply; failures are logged and counted only
    async fn finalize(&self, thread_id: &str, reply: ReplyBuffer) -> (PipelineEvent, String) {
        let complete = reply.external_message_id.is_some();
        let external_message_id = reply.external_message_id.unwrap_or_else(|| {
            format!("{LOCAL_MESSAGE_ID_PREFIX}{}", Uuid::new_v4().simple())
        });

        let stored = match reply.record_id {
            Some(record_id) => self
                .messages
                .update_assistant_message(&record_id, &reply.text, Some(&external_message_id), complete)
                .await
                .map(|()| record_id),
            None => self
                .messages
                .insert_message(
                    thread_id,
                    Sender::Assistant,
                    &MessageContent::Text(reply.text.clone()),
                    Some(&external_message_id),
                    complete,
                )
                .await
                .map(|record| record.id),
        };

        let message_id = match stored {
            Ok(id) => {
                if let Err(e) = self.lifecycle.touch(thread_id).await {
                    debug!(thread_id, error = %e, "Failed to bump thread activity");
                }
                self.metrics.record_completed();
                info!(thread_id, message_id = %id, complete, "Stored assistant reply");
                Some(id)
            }
            Err(e) => {
                self.metrics.record_degraded();
                error!(
                    thread_id,
                    external_message_id = %external_message_id,
                    error = %e,
                    "Assistant reply was delivered but could not be stored"
                );
                None
            }
        };

        (
            PipelineEvent::Done {
                message_id,
                external_message_id,
                complete,
            },
            reply.text,
        )
    }
}

/// Sends to the caller until the first failed send, then drops everything
struct Forwarder {
    tx: mpsc::Sender<PipelineEvent>,
    connected: bool,
}

impl Forwarder {
    const fn new(tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self {
            tx,
            connected: true,
        }
    }

    async fn send(&mut self, event: PipelineEvent) {
        if self.connected && self.tx.send(event).await.is_err() {
            debug!("Caller disconnected; continuing without forwarding");
            self.connected = false;
        }
    }
}

fn send_failed(error: AppError) -> AppError {
    if error.code == ErrorCode::MessageSendFailed {
        return error;
    }
    AppError::message_send_failed(error.message.clone()).with_source(error)
}

fn to_message(
    record: MessageRecord,
    attachments: Vec<AttachmentReference>,
) -> AppResult<Message> {
    Ok(Message {
        content: record.decoded_content()?,
        sender: record.sender.parse()?,
        id: record.id,
        thread_id: record.thread_id,
        external_message_id: record.external_message_id,
        is_complete: record.is_complete,
        attachments,
        created_at: record.created_at,
        updated_at: record.updated_at,
    })
}

/// Name an unnamed thread from its first exchange in a detached task
fn spawn_auto_name(
    assistant: Arc<dyn AssistantClient>,
    lifecycle: ThreadLifecycle,
    thread_id: String,
    user_text: String,
    reply_text: String,
) {
    tokio::spawn(async move {
        let prompt = format!("User: {user_text}\nAssistant: {reply_text}");
        let title = match assistant.complete_text(TITLE_SYSTEM_PROMPT, &prompt).await {
            Ok(raw) => clean_title(&raw),
            Err(e) => {
                warn!(thread_id = %thread_id, error = %e, "Title generation failed");
                return;
            }
        };

        let Some(title) = title else {
            debug!(thread_id = %thread_id, "Title generation returned nothing usable");
            return;
        };

        match lifecycle.set_name_if_unset(&thread_id, &title).await {
            Ok(true) => info!(thread_id = %thread_id, title = %title, "Named thread"),
            Ok(false) => debug!(thread_id = %thread_id, "Thread already named"),
            Err(e) => warn!(thread_id = %thread_id, error = %e, "Failed to store thread title"),
        }
    });
}

/// Strip quotes and whitespace, cap the length
#[must_use]
pub fn clean_title(raw: &str) -> Option<String> {
    let trimmed = raw
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_TITLE_CHARS).collect::<String>().trim_end().to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_title() {
        assert_eq!(
            clean_title("\"Oily skin routine\"\n").as_deref(),
            Some("Oily skin routine")
        );
        assert_eq!(clean_title("  \"\"  "), None);
        let long = "a".repeat(100);
        assert_eq!(clean_title(&long).unwrap().chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn test_pipeline_event_wire_shape() {
        let json = serde_json::to_value(PipelineEvent::Error {
            code: ErrorCode::MessageSendFailed,
            message: "boom".to_owned(),
        })
        .unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "messageSendFailed");

        let json = serde_json::to_value(PipelineEvent::Delta {
            text: "Hi".to_owned(),
        })
        .unwrap();
        assert_eq!(json["type"], "delta");
        assert_eq!(json["text"], "Hi");
    }

    #[test]
    fn test_send_failed_keeps_existing_code() {
        let err = send_failed(AppError::message_send_failed("x"));
        assert_eq!(err.code, ErrorCode::MessageSendFailed);
        let err = send_failed(AppError::external_service("svc", "down"));
        assert_eq!(err.code, ErrorCode::MessageSendFailed);
        assert!(err.message.contains("down"));
    }
}
