// ABOUTME: HTTP client for an OpenAI Assistants v2 compatible service
// ABOUTME: Implements thread, message, and run calls plus streamed runs and title completions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Assistants API Client
//!
//! All calls carry the `OpenAI-Beta: assistants=v2` header. Idempotent reads
//! (`retrieve_thread`, `retrieve_run`, `list_messages`) are retried on
//! transient failures; writes are sent once.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, instrument, warn};

use super::sse_parser::create_run_event_stream;
use super::{
    AssistantClient, RemoteMessage, RemoteRun, RemoteThread, RunEvent, RunEventStream, RunStatus,
};
use crate::config::AssistantConfig;
use crate::constants::http_client::{
    CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS, STREAM_IDLE_TIMEOUT_SECS,
};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::{ContentPart, MessageContent};

const SERVICE_NAME: &str = "AssistantService";

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiThread {
    id: String,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    metadata: Value,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    id: String,
    role: String,
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    content: Vec<ApiContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ApiContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<ApiText>,
}

#[derive(Debug, Deserialize)]
struct ApiText {
    value: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessageList {
    data: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiRun {
    id: String,
    status: RunStatus,
    #[serde(default)]
    last_error: Option<ApiRunError>,
}

#[derive(Debug, Deserialize)]
struct ApiRunError {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiChatCompletion {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Concatenate the text blocks of a message or delta
fn text_of(blocks: &[ApiContentBlock]) -> String {
    blocks
        .iter()
        .filter(|block| block.block_type == "text")
        .filter_map(|block| block.text.as_ref())
        .map(|text| text.value.as_str())
        .collect()
}

impl From<ApiMessage> for RemoteMessage {
    fn from(message: ApiMessage) -> Self {
        Self {
            text: text_of(&message.content),
            id: message.id,
            role: message.role,
            run_id: message.run_id,
        }
    }
}

impl From<ApiRun> for RemoteRun {
    fn from(run: ApiRun) -> Self {
        Self {
            id: run.id,
            status: run.status,
            last_error: run.last_error.map(|e| match e.code {
                Some(code) => format!("{code}: {}", e.message),
                None => e.message,
            }),
        }
    }
}

// ============================================================================
// Retry
// ============================================================================

/// Retry configuration for idempotent requests
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: u32,
    /// Initial delay before first retry (milliseconds)
    pub initial_delay_ms: u64,
    /// Maximum delay cap for exponential backoff (milliseconds)
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    /// `min(initial * 2^attempt, max) + jitter(0..100ms)`
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay = self
            .initial_delay_ms
            .saturating_mul(1_u64.checked_shl(attempt).unwrap_or(u64::MAX));
        let capped_delay = base_delay.min(self.max_delay_ms);
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::from(d.subsec_millis()))
            % 100;
        Duration::from_millis(capped_delay + jitter)
    }
}

/// 429, 502, and 503 are worth retrying
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 502 | 503)
}

// ============================================================================
// Stream Event Parsing
// ============================================================================

/// Map one named SSE event of a run stream to a [`RunEvent`]
///
/// Events the orchestrator does not care about (run steps, queued/in-progress
/// notifications) return `None`.
#[must_use]
pub fn parse_assistant_event(event: Option<&str>, data: &str) -> Option<AppResult<RunEvent>> {
    let event = event?;
    match event {
        "thread.message.delta" => {
            let value: Value = match serde_json::from_str(data) {
                Ok(value) => value,
                Err(e) => return Some(Err(malformed(event, &e))),
            };
            let blocks: Vec<ApiContentBlock> = value
                .pointer("/delta/content")
                .cloned()
                .and_then(|content| serde_json::from_value(content).ok())
                .unwrap_or_default();
            let text = text_of(&blocks);
            (!text.is_empty()).then_some(Ok(RunEvent::TextDelta(text)))
        }
        "thread.message.completed" => Some(
            serde_json::from_str::<ApiMessage>(data)
                .map(|message| RunEvent::MessageCompleted {
                    message_id: message.id,
                })
                .map_err(|e| malformed(event, &e)),
        ),
        "thread.run.completed" => Some(Ok(RunEvent::RunCompleted)),
        "thread.run.failed"
        | "thread.run.cancelled"
        | "thread.run.expired"
        | "thread.run.incomplete"
        | "thread.run.requires_action" => {
            let reason = serde_json::from_str::<ApiRun>(data)
                .ok()
                .and_then(|run| RemoteRun::from(run).last_error)
                .unwrap_or_else(|| event.trim_start_matches("thread.run.").to_owned());
            Some(Ok(RunEvent::RunFailed { reason }))
        }
        "error" => {
            let message = serde_json::from_str::<ApiErrorDetail>(data)
                .map_or_else(|_| data.to_owned(), |detail| detail.message);
            Some(Err(AppError::message_send_failed(format!(
                "{SERVICE_NAME} stream error: {message}"
            ))))
        }
        _ => None,
    }
}

fn malformed(event: &str, error: &serde_json::Error) -> AppError {
    AppError::external_service(SERVICE_NAME, format!("Malformed '{event}' event: {error}"))
}

// ============================================================================
// Client
// ============================================================================

/// Assistants API client
pub struct OpenAiAssistantClient {
    client: Client,
    /// Used for streamed runs only
    stream_client: Client,
    config: AssistantConfig,
    retry: RetryConfig,
}

impl OpenAiAssistantClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created
    pub fn new(config: AssistantConfig) -> AppResult<Self> {
        Self::with_timeouts(
            config,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
            Duration::from_secs(STREAM_IDLE_TIMEOUT_SECS),
        )
    }

    /// Create a client with explicit limits
    ///
    /// `request_timeout` bounds every non-streaming call end to end.
    /// Streamed runs have no total deadline and only fail after
    /// `stream_idle_timeout` passes without a chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created
    pub fn with_timeouts(
        config: AssistantConfig,
        request_timeout: Duration,
        stream_idle_timeout: Duration,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;
        let stream_client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .read_timeout(stream_idle_timeout)
            .build()
            .map_err(|e| {
                AppError::internal(format!("Failed to create streaming HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            stream_client,
            config,
            retry: RetryConfig::default(),
        })
    }

    /// Build the API URL for a given endpoint
    fn api_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint
        )
    }

    /// Add authorization and beta headers
    fn with_headers(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("OpenAI-Beta", "assistants=v2");
        if let Some(ref api_key) = self.config.api_key {
            request.bearer_auth(api_key)
        } else {
            request
        }
    }

    /// Send once, mapping transport failures
    async fn send(&self, request: RequestBuilder) -> AppResult<Response> {
        self.with_headers(request).send().await.map_err(|e| {
            error!("Failed to reach {}: {}", SERVICE_NAME, e);
            AppError::external_service(SERVICE_NAME, format!("Failed to connect: {e}"))
        })
    }

    /// Send a GET, retrying on connection errors and retryable statuses
    async fn get_with_retry(&self, url: &str) -> AppResult<Response> {
        let mut attempt = 0;
        loop {
            let result = self.with_headers(self.client.get(url)).send().await;
            let retryable = match &result {
                Ok(response) => is_retryable_status(response.status().as_u16()),
                Err(e) => e.is_connect() || e.is_timeout(),
            };

            if !retryable || attempt >= self.retry.max_retries {
                return result.map_err(|e| {
                    AppError::external_service(SERVICE_NAME, format!("Failed to connect: {e}"))
                });
            }

            let delay = self.retry.delay_for_attempt(attempt);
            warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Retrying {} request to {}",
                SERVICE_NAME,
                url
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Read a successful JSON body or turn the failure into an `AppError`
    async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> AppResult<T> {
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::external_service(SERVICE_NAME, format!("Failed to read response: {e}"))
        })?;

        if !status.is_success() {
            return Err(Self::parse_error_response(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            AppError::external_service(SERVICE_NAME, format!("Failed to parse response: {e}"))
        })
    }

    /// Parse error response from API
    fn parse_error_response(status: StatusCode, body: &str) -> AppError {
        let detail = serde_json::from_str::<ApiErrorResponse>(body).map_or_else(
            |_| body.chars().take(200).collect::<String>(),
            |response| {
                let error_type = response
                    .error
                    .error_type
                    .unwrap_or_else(|| "unknown".to_owned());
                format!("{error_type} - {}", response.error.message)
            },
        );

        match status {
            StatusCode::NOT_FOUND => AppError::not_found(format!("{SERVICE_NAME} resource ({detail})")),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::external_service(
                SERVICE_NAME,
                format!("Authentication failed: {detail}"),
            ),
            _ => AppError::external_service(SERVICE_NAME, format!("API error ({status}): {detail}")),
        }
    }

    /// Request body for a user message
    fn message_body(content: &MessageContent) -> Value {
        let content = match content {
            MessageContent::Text(text) => json!(text),
            MessageContent::Parts(parts) => Value::Array(
                parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => json!({"type": "text", "text": text}),
                        ContentPart::ImageFile { file_id, detail } => {
                            let mut image_file = json!({"file_id": file_id});
                            if let Some(detail) = detail {
                                image_file["detail"] = json!(detail);
                            }
                            json!({"type": "image_file", "image_file": image_file})
                        }
                    })
                    .collect(),
            ),
        };
        json!({"role": "user", "content": content})
    }

    /// Remote metadata only accepts string values
    fn remote_metadata(metadata: &Value) -> Value {
        let Some(object) = metadata.as_object() else {
            return json!({});
        };
        Value::Object(
            object
                .iter()
                .map(|(key, value)| {
                    let value = value
                        .as_str()
                        .map_or_else(|| value.to_string(), ToOwned::to_owned);
                    (key.clone(), Value::String(value))
                })
                .collect(),
        )
    }
}

#[async_trait]
impl AssistantClient for OpenAiAssistantClient {
    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    #[instrument(skip(self, metadata))]
    async fn create_thread(&self, metadata: &Value) -> AppResult<RemoteThread> {
        let request = self
            .client
            .post(self.api_url("threads"))
            .json(&json!({"metadata": Self::remote_metadata(metadata)}));
        let thread: ApiThread = Self::parse_json(self.send(request).await?).await?;

        debug!(external_thread_id = %thread.id, "Created remote thread");
        Ok(RemoteThread {
            id: thread.id,
            created_at: thread.created_at,
            metadata: thread.metadata,
        })
    }

    #[instrument(skip(self))]
    async fn retrieve_thread(&self, thread_id: &str) -> AppResult<Option<RemoteThread>> {
        let response = self
            .get_with_retry(&self.api_url(&format!("threads/{thread_id}")))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let thread: ApiThread = Self::parse_json(response).await?;
        Ok(Some(RemoteThread {
            id: thread.id,
            created_at: thread.created_at,
            metadata: thread.metadata,
        }))
    }

    #[instrument(skip(self))]
    async fn delete_thread(&self, thread_id: &str) -> AppResult<()> {
        let request = self
            .client
            .delete(self.api_url(&format!("threads/{thread_id}")));
        let _: Value = Self::parse_json(self.send(request).await?).await?;
        Ok(())
    }

    #[instrument(skip(self, content))]
    async fn create_message(
        &self,
        thread_id: &str,
        content: &MessageContent,
    ) -> AppResult<RemoteMessage> {
        let request = self
            .client
            .post(self.api_url(&format!("threads/{thread_id}/messages")))
            .json(&Self::message_body(content));
        let message: ApiMessage = Self::parse_json(self.send(request).await?).await?;
        Ok(message.into())
    }

    #[instrument(skip(self))]
    async fn stream_run(&self, thread_id: &str) -> AppResult<RunEventStream> {
        let request = self
            .stream_client
            .post(self.api_url(&format!("threads/{thread_id}/runs")))
            .json(&json!({"assistant_id": self.config.assistant_id, "stream": true}));
        let response = self.send(request).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = Self::parse_error_response(status, &body);
            return Err(AppError::new(ErrorCode::MessageSendFailed, error.message));
        }

        Ok(create_run_event_stream(
            response.bytes_stream(),
            parse_assistant_event,
            SERVICE_NAME,
        ))
    }

    #[instrument(skip(self))]
    async fn create_run(&self, thread_id: &str) -> AppResult<RemoteRun> {
        let request = self
            .client
            .post(self.api_url(&format!("threads/{thread_id}/runs")))
            .json(&json!({"assistant_id": self.config.assistant_id}));
        let run: ApiRun = Self::parse_json(self.send(request).await?).await?;
        Ok(run.into())
    }

    #[instrument(skip(self))]
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> AppResult<RemoteRun> {
        let response = self
            .get_with_retry(&self.api_url(&format!("threads/{thread_id}/runs/{run_id}")))
            .await?;
        let run: ApiRun = Self::parse_json(response).await?;
        Ok(run.into())
    }

    #[instrument(skip(self))]
    async fn list_messages(&self, thread_id: &str, limit: u32) -> AppResult<Vec<RemoteMessage>> {
        let response = self
            .get_with_retry(&self.api_url(&format!(
                "threads/{thread_id}/messages?order=desc&limit={limit}"
            )))
            .await?;
        let list: ApiMessageList = Self::parse_json(response).await?;
        Ok(list.data.into_iter().map(RemoteMessage::from).collect())
    }

    #[instrument(skip(self, system_prompt, user_prompt))]
    async fn complete_text(&self, system_prompt: &str, user_prompt: &str) -> AppResult<String> {
        let request = self.client.post(self.api_url("chat/completions")).json(&json!({
            "model": self.config.title_model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "temperature": 0.3,
            "max_tokens": 30
        }));
        let completion: ApiChatCompletion = Self::parse_json(self.send(request).await?).await?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::external_service(SERVICE_NAME, "API returned no choices"))
    }
}
