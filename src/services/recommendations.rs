// ABOUTME: Recommendation extractor asking the assistant to pick catalog items inside a thread
// ABOUTME: Polls the run to completion, pulls the first JSON id array from the reply, and keeps known ids only
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Recommendation Extractor
//!
//! Flow: authorize, fetch catalog, submit prompt, poll run, parse, validate.
//!
//! The reply is free text that should embed an array such as
//! `Here you go: ["a1","a2"]`. The first non-greedy `[...]` match is taken.
//! A reply with several bracketed fragments, or a nested array, can
//! therefore yield the wrong fragment; that case surfaces as
//! `invalidRecommendationFormat` or as ids dropped during validation.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::thread_lifecycle::ThreadLifecycle;
use super::usage_limiter::UsageLimiter;
use crate::assistant::{AssistantClient, RemoteMessage, RemoteRun};
use crate::catalog::CatalogProvider;
use crate::config::RecommendationConfig;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::{CatalogItem, MessageContent};

/// Replies fetched when looking for the answer to a run
const REPLY_LOOKBACK: u32 = 10;

static ID_ARRAY_PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn id_array_pattern() -> AppResult<&'static Regex> {
    ID_ARRAY_PATTERN
        .get_or_init(|| Regex::new(r"(?s)\[.*?\]"))
        .as_ref()
        .map_err(|e| AppError::internal(format!("Invalid id array pattern: {e}")))
}

/// Picks catalog items for a thread via the assistant
pub struct RecommendationExtractor {
    assistant: Arc<dyn AssistantClient>,
    lifecycle: ThreadLifecycle,
    limiter: Arc<UsageLimiter>,
    catalog: Arc<dyn CatalogProvider>,
    config: RecommendationConfig,
}

impl RecommendationExtractor {
    /// Create the extractor
    #[must_use]
    pub fn new(
        assistant: Arc<dyn AssistantClient>,
        lifecycle: ThreadLifecycle,
        limiter: Arc<UsageLimiter>,
        catalog: Arc<dyn CatalogProvider>,
        config: RecommendationConfig,
    ) -> Self {
        Self {
            assistant,
            lifecycle,
            limiter,
            catalog,
            config,
        }
    }

    /// Ask the assistant for up to `max_items` catalog ids suited to the conversation
    ///
    /// The result may be empty when every returned id is unknown.
    ///
    /// # Errors
    ///
    /// Returns ownership and quota errors, `EmptyCatalog`, `RunFailed`,
    /// `RunTimedOut`, `InvalidRecommendationFormat`, or `UpstreamFailure`
    pub async fn recommend(
        &self,
        thread_id: &str,
        user_id: &str,
        max_items: Option<usize>,
    ) -> AppResult<Vec<String>> {
        let thread = self.lifecycle.authorize(thread_id, user_id).await?;
        self.limiter.authorize(user_id).await?;

        let catalog = self.catalog.active_items().await?;
        if catalog.is_empty() {
            return Err(AppError::new(
                ErrorCode::EmptyCatalog,
                "The product catalog has no active items",
            ));
        }

        let max_items = max_items.unwrap_or(self.config.default_max_items).max(1);
        let prompt = build_prompt(&catalog, max_items);
        self.assistant
            .create_message(&thread.external_thread_id, &MessageContent::Text(prompt))
            .await?;

        let run = self.assistant.create_run(&thread.external_thread_id).await?;
        let run = self.wait_for_run(&thread.external_thread_id, run).await?;

        let replies = self
            .assistant
            .list_messages(&thread.external_thread_id, REPLY_LOOKBACK)
            .await?;
        let reply = select_reply(&replies, &run.id).ok_or_else(|| {
            AppError::new(
                ErrorCode::InvalidRecommendationFormat,
                "The assistant did not reply to the recommendation request",
            )
        })?;

        let candidates = extract_id_array(&reply.text)?;
        let selected = validate_ids(&candidates, &catalog, max_items);
        info!(
            thread_id,
            user_id,
            candidates = candidates.len(),
            selected = selected.len(),
            "Recommendations extracted"
        );
        Ok(selected)
    }

    /// Poll until the run completes, fails, or runs out of attempts
    async fn wait_for_run(&self, external_thread_id: &str, mut run: RemoteRun) -> AppResult<RemoteRun> {
        for attempt in 0..self.config.max_poll_attempts {
            if run.status.is_completed() {
                return Ok(run);
            }
            if run.status.is_terminal_failure() {
                warn!(run_id = %run.id, status = ?run.status, "Recommendation run failed");
                return Err(AppError::new(
                    ErrorCode::RunFailed,
                    format!(
                        "Run {} ended with status {:?}: {}",
                        run.id,
                        run.status,
                        run.last_error.as_deref().unwrap_or("no detail")
                    ),
                ));
            }

            debug!(run_id = %run.id, attempt, status = ?run.status, "Waiting for run");
            tokio::time::sleep(self.config.poll_interval()).await;
            run = self.assistant.retrieve_run(external_thread_id, &run.id).await?;
        }

        if run.status.is_completed() {
            return Ok(run);
        }
        Err(AppError::new(
            ErrorCode::RunTimedOut,
            format!(
                "Run {} did not finish after {} polls",
                run.id, self.config.max_poll_attempts
            ),
        ))
    }
}

fn build_prompt(catalog: &[CatalogItem], max_items: usize) -> String {
    let mut prompt = format!(
        "Based on our conversation, choose at most {max_items} products from the catalog below. \
Respond with a JSON array of product ids only, for example [\"id1\", \"id2\"].\n\nCatalog:\n"
    );
    for item in catalog {
        let _ = write!(prompt, "- {}: {}", item.id, item.name);
        if let Some(category) = &item.category {
            let _ = write!(prompt, " ({category})");
        }
        if let Some(description) = &item.description {
            let _ = write!(prompt, ". {description}");
        }
        prompt.push('\n');
    }
    prompt
}

/// The assistant answer produced by `run_id`, else the newest assistant message
fn select_reply<'a>(replies: &'a [RemoteMessage], run_id: &str) -> Option<&'a RemoteMessage> {
    let mut assistant_replies = replies.iter().filter(|m| m.role == "assistant");
    replies
        .iter()
        .find(|m| m.role == "assistant" && m.run_id.as_deref() == Some(run_id))
        .or_else(|| assistant_replies.next())
}

/// First bracketed fragment of `text` parsed as an array of ids
///
/// # Errors
///
/// Returns `InvalidRecommendationFormat` when no fragment is found or it is
/// not a JSON array
pub fn extract_id_array(text: &str) -> AppResult<Vec<String>> {
    let invalid = |detail: &str| {
        AppError::new(
            ErrorCode::InvalidRecommendationFormat,
            format!("Recommendation reply {detail}"),
        )
    };

    let fragment = id_array_pattern()?
        .find(text)
        .ok_or_else(|| invalid("contains no JSON array"))?;

    let values: Vec<Value> = serde_json::from_str(fragment.as_str())
        .map_err(|e| invalid(&format!("has an unparseable array: {e}")))?;

    Ok(values
        .into_iter()
        .filter_map(|value| match value {
            Value::String(id) => Some(id),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}

/// Keep catalog ids only, in reply order, without duplicates, at most `max_items`
#[must_use]
pub fn validate_ids(candidates: &[String], catalog: &[CatalogItem], max_items: usize) -> Vec<String> {
    let known: HashSet<&str> = catalog.iter().map(|item| item.id.as_str()).collect();
    let mut seen = HashSet::new();
    candidates
        .iter()
        .filter(|id| known.contains(id.as_str()))
        .filter(|id| seen.insert(id.as_str()))
        .take(max_items)
        .cloned()
        .collect()
}
