// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides an in-memory store, a scripted assistant double, and wired server resources
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
//! Shared test utilities for `skincare_assistant`

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use futures_util::StreamExt as _;
use serde_json::Value;
use skincare_assistant::{
    assistant::{
        AssistantClient, RemoteMessage, RemoteRun, RemoteThread, RunEvent, RunEventStream,
        RunStatus,
    },
    catalog::{CatalogProvider, DatabaseCatalogProvider},
    config::{
        AssistantConfig, AuthConfig, PipelineConfig, RecommendationConfig, ServerConfig,
        UsageConfig,
    },
    database::Database,
    enrichment::{NoopEnricher, ProfileEnricher},
    errors::{AppError, AppResult},
    models::{CatalogItem, MessageContent, NewThread, Thread},
    resources::ServerResources,
};

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Standard test database setup
pub async fn create_test_database() -> Database {
    init_test_logging();
    Database::new("sqlite::memory:").await.unwrap()
}

/// Configuration tuned for fast tests
pub fn test_config() -> ServerConfig {
    ServerConfig {
        http_port: 0,
        database_url: "sqlite::memory:".to_owned(),
        assistant: AssistantConfig {
            base_url: "http://127.0.0.1:9".to_owned(),
            api_key: None,
            assistant_id: "asst_test".to_owned(),
            title_model: "test-model".to_owned(),
        },
        usage: UsageConfig::default(),
        pipeline: PipelineConfig {
            enrichment_timeout_ms: 200,
            auto_name_threads: true,
        },
        recommendations: RecommendationConfig {
            poll_interval_ms: 5,
            max_poll_attempts: 5,
            default_max_items: 3,
        },
        auth: AuthConfig::default(),
    }
}

// ============================================================================
// Scripted assistant double
// ============================================================================

/// Calls observed by [`MockAssistant`]
#[derive(Debug, Default)]
pub struct MockCalls {
    pub created_threads: Vec<String>,
    pub deleted_threads: Vec<String>,
    pub messages: Vec<(String, MessageContent)>,
    pub stream_runs: u32,
    pub created_runs: u32,
    pub retrieved_runs: u32,
    pub completions: u32,
}

/// Assistant double whose behavior is scripted per test
pub struct MockAssistant {
    calls: Mutex<MockCalls>,
    next_id: AtomicU32,
    fail_create_thread: AtomicBool,
    fail_delete: AtomicBool,
    fail_create_message: AtomicBool,
    vanished_threads: Mutex<HashSet<String>>,
    run_events: Mutex<Vec<RunEvent>>,
    stream_error: Mutex<Option<String>>,
    stream_delay: Mutex<Option<Duration>>,
    run_statuses: Mutex<VecDeque<RunStatus>>,
    last_run_id: Mutex<Option<String>>,
    reply_text: Mutex<String>,
    title: Mutex<Option<String>>,
}

impl Default for MockAssistant {
    fn default() -> Self {
        Self {
            calls: Mutex::new(MockCalls::default()),
            next_id: AtomicU32::new(1),
            fail_create_thread: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            fail_create_message: AtomicBool::new(false),
            vanished_threads: Mutex::new(HashSet::new()),
            run_events: Mutex::new(vec![
                RunEvent::TextDelta("Hi".to_owned()),
                RunEvent::TextDelta(" there".to_owned()),
                RunEvent::MessageCompleted {
                    message_id: "msg_assistant_1".to_owned(),
                },
                RunEvent::RunCompleted,
            ]),
            stream_error: Mutex::new(None),
            stream_delay: Mutex::new(None),
            run_statuses: Mutex::new(VecDeque::new()),
            last_run_id: Mutex::new(None),
            reply_text: Mutex::new(String::new()),
            title: Mutex::new(Some("Skincare chat".to_owned())),
        }
    }
}

impl MockAssistant {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn calls(&self) -> std::sync::MutexGuard<'_, MockCalls> {
        self.calls.lock().unwrap()
    }

    pub fn message_count(&self) -> usize {
        self.calls().messages.len()
    }

    pub fn set_fail_create_thread(&self, fail: bool) {
        self.fail_create_thread.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_create_message(&self, fail: bool) {
        self.fail_create_message.store(fail, Ordering::SeqCst);
    }

    /// Make the service forget a thread as if it was deleted remotely
    pub fn vanish_thread(&self, external_thread_id: &str) {
        self.vanished_threads
            .lock()
            .unwrap()
            .insert(external_thread_id.to_owned());
    }

    pub fn set_run_events(&self, events: Vec<RunEvent>) {
        *self.run_events.lock().unwrap() = events;
    }

    /// Append a transport error after the scripted events
    pub fn set_stream_error(&self, message: &str) {
        *self.stream_error.lock().unwrap() = Some(message.to_owned());
    }

    /// Pause before every scripted event
    pub fn set_stream_delay(&self, delay: Duration) {
        *self.stream_delay.lock().unwrap() = Some(delay);
    }

    /// Statuses returned by `create_run` then each `retrieve_run`; `completed` once exhausted
    pub fn set_run_statuses(&self, statuses: Vec<RunStatus>) {
        *self.run_statuses.lock().unwrap() = statuses.into();
    }

    pub fn set_reply(&self, text: &str) {
        *self.reply_text.lock().unwrap() = text.to_owned();
    }

    pub fn set_title(&self, title: Option<&str>) {
        *self.title.lock().unwrap() = title.map(ToOwned::to_owned);
    }

    fn next_status(&self) -> RunStatus {
        self.run_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RunStatus::Completed)
    }
}

#[async_trait]
impl AssistantClient for MockAssistant {
    fn name(&self) -> &'static str {
        "mock-assistant"
    }

    async fn create_thread(&self, metadata: &Value) -> AppResult<RemoteThread> {
        if self.fail_create_thread.load(Ordering::SeqCst) {
            return Err(AppError::external_service("mock-assistant", "thread create refused"));
        }
        let id = self.next("thread");
        self.calls().created_threads.push(id.clone());
        Ok(RemoteThread {
            id,
            created_at: Some(1_700_000_000),
            metadata: metadata.clone(),
        })
    }

    async fn retrieve_thread(&self, thread_id: &str) -> AppResult<Option<RemoteThread>> {
        if self.vanished_threads.lock().unwrap().contains(thread_id) {
            return Ok(None);
        }
        Ok(Some(RemoteThread {
            id: thread_id.to_owned(),
            created_at: Some(1_700_000_000),
            metadata: serde_json::json!({}),
        }))
    }

    async fn delete_thread(&self, thread_id: &str) -> AppResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(AppError::external_service("mock-assistant", "delete refused"));
        }
        if self.vanished_threads.lock().unwrap().contains(thread_id) {
            return Err(AppError::not_found(format!("mock-assistant thread {thread_id}")));
        }
        self.calls().deleted_threads.push(thread_id.to_owned());
        Ok(())
    }

    async fn create_message(
        &self,
        thread_id: &str,
        content: &MessageContent,
    ) -> AppResult<RemoteMessage> {
        if self.fail_create_message.load(Ordering::SeqCst) {
            return Err(AppError::external_service("mock-assistant", "message refused"));
        }
        self.calls()
            .messages
            .push((thread_id.to_owned(), content.clone()));
        Ok(RemoteMessage {
            id: self.next("msg_user"),
            role: "user".to_owned(),
            run_id: None,
            text: content.text(),
        })
    }

    async fn stream_run(&self, _thread_id: &str) -> AppResult<RunEventStream> {
        self.calls().stream_runs += 1;

        let mut items: Vec<AppResult<RunEvent>> = self
            .run_events
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .map(Ok)
            .collect();
        if let Some(message) = self.stream_error.lock().unwrap().clone() {
            items.push(Err(AppError::external_service("mock-assistant", message)));
        }

        let delay = *self.stream_delay.lock().unwrap();
        let events = stream::iter(items).then(move |item| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            item
        });
        Ok(Box::pin(events))
    }

    async fn create_run(&self, _thread_id: &str) -> AppResult<RemoteRun> {
        self.calls().created_runs += 1;
        let id = self.next("run");
        *self.last_run_id.lock().unwrap() = Some(id.clone());
        Ok(RemoteRun {
            id,
            status: self.next_status(),
            last_error: None,
        })
    }

    async fn retrieve_run(&self, _thread_id: &str, run_id: &str) -> AppResult<RemoteRun> {
        self.calls().retrieved_runs += 1;
        let status = self.next_status();
        Ok(RemoteRun {
            id: run_id.to_owned(),
            status,
            last_error: (status == RunStatus::Failed).then(|| "server_error".to_owned()),
        })
    }

    async fn list_messages(&self, _thread_id: &str, _limit: u32) -> AppResult<Vec<RemoteMessage>> {
        Ok(vec![RemoteMessage {
            id: self.next("msg_reply"),
            role: "assistant".to_owned(),
            run_id: self.last_run_id.lock().unwrap().clone(),
            text: self.reply_text.lock().unwrap().clone(),
        }])
    }

    async fn complete_text(&self, _system_prompt: &str, _user_prompt: &str) -> AppResult<String> {
        self.calls().completions += 1;
        self.title
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AppError::external_service("mock-assistant", "no completion"))
    }
}


// ============================================================================
// Enricher doubles
// ============================================================================

/// Enricher that always fails
pub struct FailingEnricher;

#[async_trait]
impl ProfileEnricher for FailingEnricher {
    async fn enrich(&self, _user_id: &str, _content: &MessageContent) -> AppResult<MessageContent> {
        Err(AppError::external_service("profile", "profile service down"))
    }
}

/// Enricher that never answers within the pipeline budget
pub struct SlowEnricher;

#[async_trait]
impl ProfileEnricher for SlowEnricher {
    async fn enrich(&self, _user_id: &str, content: &MessageContent) -> AppResult<MessageContent> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(content.clone())
    }
}

// ============================================================================
// Resources
// ============================================================================

/// Resources over an in-memory store with the stock enricher and catalog
pub async fn create_test_resources(assistant: Arc<MockAssistant>) -> Arc<ServerResources> {
    let database = create_test_database().await;
    Arc::new(ServerResources::new(
        database,
        Arc::new(test_config()),
        assistant,
    ))
}

/// Resources with an explicit enricher and config
pub async fn create_test_resources_with(
    assistant: Arc<MockAssistant>,
    enricher: Arc<dyn ProfileEnricher>,
    config: ServerConfig,
) -> Arc<ServerResources> {
    let database = create_test_database().await;
    let catalog: Arc<dyn CatalogProvider> =
        Arc::new(DatabaseCatalogProvider::new(database.catalog()));
    Arc::new(ServerResources::with_collaborators(
        database,
        Arc::new(config),
        assistant,
        enricher,
        catalog,
    ))
}

/// Resources whose enricher never changes content
pub async fn create_plain_test_resources(assistant: Arc<MockAssistant>) -> Arc<ServerResources> {
    create_test_resources_with(assistant, Arc::new(NoopEnricher), test_config()).await
}

/// Create a thread owned by `owner_id`
pub async fn create_thread(resources: &ServerResources, owner_id: &str) -> Thread {
    resources
        .threads
        .create_thread(owner_id, &NewThread::default())
        .await
        .unwrap()
}

/// Insert active catalog products
pub async fn seed_catalog(resources: &ServerResources, ids: &[&str]) {
    for id in ids {
        resources
            .database
            .catalog()
            .upsert_product(
                &CatalogItem {
                    id: (*id).to_owned(),
                    name: format!("Product {id}"),
                    description: Some("Gentle formula".to_owned()),
                    category: Some("serum".to_owned()),
                },
                true,
            )
            .await
            .unwrap();
    }
}

/// Poll until `check` holds or give up after a second
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
