// ABOUTME: Abstraction over the external LLM assistant service (threads, messages, runs)
// ABOUTME: Defines remote resource types, run stream events, and the client trait injected into services
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Assistant Service Abstraction
//!
//! The orchestrator never talks HTTP directly. Services receive an
//! `Arc<dyn AssistantClient>` so tests can substitute a scripted double.
//!
//! A streamed run yields [`RunEvent`] values:
//!
//! ```text
//! TextDelta("Hi") -> TextDelta(" there") -> MessageCompleted { message_id } -> RunCompleted
//! ```

/// HTTP implementation against an Assistants-style REST API
pub mod openai;
/// SSE line buffering for run streams
pub mod sse_parser;

pub use openai::OpenAiAssistantClient;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::errors::AppResult;
use crate::models::MessageContent;

/// Thread as known by the assistant service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteThread {
    /// External thread id
    pub id: String,
    /// Creation time (unix seconds)
    #[serde(default)]
    pub created_at: Option<i64>,
    /// Metadata stored remotely
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Message as known by the assistant service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessage {
    /// External message id
    pub id: String,
    /// `user` or `assistant`
    pub role: String,
    /// Run that produced the message, for assistant replies
    #[serde(default)]
    pub run_id: Option<String>,
    /// Concatenated text parts
    pub text: String,
}

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Waiting to start
    Queued,
    /// Executing
    InProgress,
    /// Waiting on tool outputs
    RequiresAction,
    /// Cancellation requested
    Cancelling,
    /// Cancelled
    Cancelled,
    /// Failed
    Failed,
    /// Finished successfully
    Completed,
    /// Finished without a full answer
    Incomplete,
    /// Timed out on the service side
    Expired,
    /// Status this client does not know
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Successful terminal state
    #[must_use]
    pub const fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Terminal states that will never produce an answer
    #[must_use]
    pub const fn is_terminal_failure(self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Failed | Self::Expired | Self::Incomplete | Self::RequiresAction
        )
    }
}

/// Run as known by the assistant service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRun {
    /// External run id
    pub id: String,
    /// Current status
    pub status: RunStatus,
    /// Failure detail when the run failed
    #[serde(default)]
    pub last_error: Option<String>,
}

/// One event of a streamed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// Incremental assistant text
    TextDelta(String),
    /// The assistant message was finalized remotely
    MessageCompleted {
        /// External id of the finalized message
        message_id: String,
    },
    /// The run finished successfully
    RunCompleted,
    /// The run ended without success
    RunFailed {
        /// Reason reported by the service
        reason: String,
    },
}

/// Stream of run events
pub type RunEventStream = Pin<Box<dyn Stream<Item = AppResult<RunEvent>> + Send>>;

/// Client for the external assistant service
#[async_trait]
pub trait AssistantClient: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Create a remote thread
    async fn create_thread(&self, metadata: &serde_json::Value) -> AppResult<RemoteThread>;

    /// Fetch a remote thread; `Ok(None)` when the service no longer knows it
    async fn retrieve_thread(&self, thread_id: &str) -> AppResult<Option<RemoteThread>>;

    /// Delete a remote thread
    async fn delete_thread(&self, thread_id: &str) -> AppResult<()>;

    /// Append a user message to a remote thread
    async fn create_message(
        &self,
        thread_id: &str,
        content: &MessageContent,
    ) -> AppResult<RemoteMessage>;

    /// Start a run and stream its events
    async fn stream_run(&self, thread_id: &str) -> AppResult<RunEventStream>;

    /// Start a run without streaming
    async fn create_run(&self, thread_id: &str) -> AppResult<RemoteRun>;

    /// Fetch the current state of a run
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> AppResult<RemoteRun>;

    /// Most recent messages of a thread, newest first
    async fn list_messages(&self, thread_id: &str, limit: u32) -> AppResult<Vec<RemoteMessage>>;

    /// One-shot completion outside any thread
    async fn complete_text(&self, system_prompt: &str, user_prompt: &str) -> AppResult<String>;
}
