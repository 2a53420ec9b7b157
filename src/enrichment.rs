// ABOUTME: Profile enrichment collaborator that prefixes outgoing messages with the user's skin profile
// ABOUTME: The pipeline bounds every call with a timeout and falls back to the original content on failure
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use async_trait::async_trait;
use serde_json::Value;

use crate::database::CatalogManager;
use crate::errors::AppResult;
use crate::models::{ContentPart, MessageContent};

/// Adds user context to a message before it is sent to the assistant
#[async_trait]
pub trait ProfileEnricher: Send + Sync {
    /// Return the content to send; may be `content` unchanged
    async fn enrich(&self, user_id: &str, content: &MessageContent) -> AppResult<MessageContent>;
}

/// Enricher that never changes the content
pub struct NoopEnricher;

#[async_trait]
impl ProfileEnricher for NoopEnricher {
    async fn enrich(&self, _user_id: &str, content: &MessageContent) -> AppResult<MessageContent> {
        Ok(content.clone())
    }
}

/// Enricher reading the stored `user_profiles` JSON
pub struct ProfileContextEnricher {
    catalog: CatalogManager,
}

impl ProfileContextEnricher {
    /// Create an enricher over the profile table
    #[must_use]
    pub const fn new(catalog: CatalogManager) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ProfileEnricher for ProfileContextEnricher {
    async fn enrich(&self, user_id: &str, content: &MessageContent) -> AppResult<MessageContent> {
        let Some(profile) = self.catalog.get_profile(user_id).await? else {
            return Ok(content.clone());
        };

        match profile_context(&profile) {
            Some(context) => Ok(prepend_context(content, &context)),
            None => Ok(content.clone()),
        }
    }
}

/// Render a flat profile object as a single context line
///
/// Arrays are joined with commas; nested objects and nulls are skipped.
#[must_use]
pub fn profile_context(profile: &Value) -> Option<String> {
    let fields: Vec<String> = profile
        .as_object()?
        .iter()
        .filter_map(|(key, value)| {
            let rendered = match value {
                Value::String(s) if !s.trim().is_empty() => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Array(items) if !items.is_empty() => items
                    .iter()
                    .map(|item| item.as_str().map_or_else(|| item.to_string(), ToOwned::to_owned))
                    .collect::<Vec<_>>()
                    .join(", "),
                _ => return None,
            };
            Some(format!("{}: {rendered}", key.replace('_', " ")))
        })
        .collect();

    if fields.is_empty() {
        None
    } else {
        Some(format!("[User skin profile] {}", fields.join("; ")))
    }
}

/// Put the context before the user's words, keeping file parts in place
#[must_use]
pub fn prepend_context(content: &MessageContent, context: &str) -> MessageContent {
    match content {
        MessageContent::Text(text) => MessageContent::Text(format!("{context}\n\n{text}")),
        MessageContent::Parts(parts) => {
            let mut enriched = Vec::with_capacity(parts.len() + 1);
            enriched.push(ContentPart::Text {
                text: context.to_owned(),
            });
            enriched.extend(parts.iter().cloned());
            MessageContent::Parts(enriched)
        }
    }
}
