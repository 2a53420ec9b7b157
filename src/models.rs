// ABOUTME: Core domain types for conversation threads, messages, attachments, and usage counters
// ABOUTME: Defines the tagged message content union shared by the pipeline, storage, and HTTP layers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Domain Models
//!
//! Message content is either plain text or an ordered list of parts, each part
//! being text or a reference to a file already uploaded to the assistant
//! service. Storage keeps the raw form plus a content-type tag so the exact
//! shape can be rebuilt on read.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

// ============================================================================
// Message Content
// ============================================================================

/// A single part of a multi-part message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text fragment
    Text {
        /// Text value
        text: String,
    },
    /// Reference to an image file known to the assistant service
    ImageFile {
        /// External file id
        file_id: String,
        /// Optional rendering detail hint (`low`, `high`, `auto`)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

/// Message content as sent by clients and persisted locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text message
    Text(String),
    /// Ordered multi-part message
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Storage tag describing which variant is persisted
    #[must_use]
    pub const fn content_type(&self) -> ContentType {
        match self {
            Self::Text(_) => ContentType::Text,
            Self::Parts(_) => ContentType::Multipart,
        }
    }

    /// External file ids referenced by image parts, in message order
    #[must_use]
    pub fn image_file_ids(&self) -> Vec<&str> {
        match self {
            Self::Text(_) => Vec::new(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::ImageFile { file_id, .. } => Some(file_id.as_str()),
                    ContentPart::Text { .. } => None,
                })
                .collect(),
        }
    }

    /// Concatenated text of the message, ignoring file parts
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageFile { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// True when there is no text and no file reference
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Parts(parts) => parts.iter().all(|part| match part {
                ContentPart::Text { text } => text.trim().is_empty(),
                ContentPart::ImageFile { file_id, .. } => file_id.trim().is_empty(),
            }),
        }
    }

    /// Encode into the raw column value
    ///
    /// # Errors
    ///
    /// Returns an error if multi-part content cannot be serialized
    pub fn to_raw(&self) -> AppResult<String> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            Self::Parts(parts) => Ok(serde_json::to_string(parts)?),
        }
    }

    /// Decode a raw column value using its stored content-type tag
    ///
    /// # Errors
    ///
    /// Returns an error if a multi-part value is not valid JSON parts
    pub fn from_raw(raw: &str, content_type: ContentType) -> AppResult<Self> {
        match content_type {
            ContentType::Text => Ok(Self::Text(raw.to_owned())),
            ContentType::Multipart => Ok(Self::Parts(serde_json::from_str(raw)?)),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Stored content-type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Raw text
    Text,
    /// JSON array of [`ContentPart`]
    Multipart,
}

impl ContentType {
    /// Column value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Multipart => "multipart",
        }
    }
}

impl FromStr for ContentType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "multipart" => Ok(Self::Multipart),
            other => Err(AppError::internal(format!("Unknown content type '{other}'"))),
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// End user
    User,
    /// Assistant reply
    Assistant,
}

impl Sender {
    /// Column value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sender {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(AppError::internal(format!("Unknown sender '{other}'"))),
        }
    }
}

/// A persisted message with its content reconstructed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Local message id
    pub id: String,
    /// Local thread id
    pub thread_id: String,
    /// External message id once acknowledged
    pub external_message_id: Option<String>,
    /// Author
    pub sender: Sender,
    /// Reconstructed content
    pub content: MessageContent,
    /// False while an assistant reply is still streaming or when it never got an external id
    pub is_complete: bool,
    /// File references linked to this message
    pub attachments: Vec<AttachmentReference>,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    /// Last update timestamp (RFC 3339)
    pub updated_at: String,
}

// ============================================================================
// Threads
// ============================================================================

/// Local record of a conversation bound to an external thread
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Thread {
    /// Local id (UUID)
    pub id: String,
    /// External thread id, never re-bound
    pub external_thread_id: String,
    /// Owning user
    pub owner_id: String,
    /// Title, set once
    pub name: Option<String>,
    /// Free text description
    pub description: Option<String>,
    /// Caller supplied metadata
    pub metadata: serde_json::Value,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    /// Last update timestamp (RFC 3339)
    pub updated_at: String,
}

/// Fields accepted when creating a thread
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewThread {
    /// Optional initial name
    #[serde(default)]
    pub name: Option<String>,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// Optional metadata object
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

// ============================================================================
// Attachments
// ============================================================================

/// Cross reference between a local file, an external file id, and the message using it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentReference {
    /// Local record id
    pub id: String,
    /// External file id (natural key)
    pub external_file_id: String,
    /// Local storage file id when known
    pub local_file_id: Option<String>,
    /// Owner when known
    pub owner_id: Option<String>,
    /// Message that referenced the file
    pub message_id: Option<String>,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
}

// ============================================================================
// Usage
// ============================================================================

/// Outcome of a quota increment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum UsageDecision {
    /// Increment applied; carries the new count
    Allowed {
        /// Count after the increment
        count: u32,
    },
    /// Limit already reached; nothing changed
    Denied,
}

impl UsageDecision {
    /// Whether the invocation may proceed
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Current usage snapshot for a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageSnapshot {
    /// Invocations counted in the current usage day
    pub count: u32,
    /// Limit in force for the user
    pub limit: u32,
    /// Start date of the usage day (YYYY-MM-DD)
    pub period_start: String,
    /// When the counter resets (RFC 3339)
    pub resets_at: String,
}

// ============================================================================
// Catalog
// ============================================================================

/// Active catalog entry offered to the recommendation prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogItem {
    /// Product id returned by the model
    pub id: String,
    /// Display name
    pub name: String,
    /// Short description
    pub description: Option<String>,
    /// Category label
    pub category: Option<String>,
}
