// ABOUTME: Database operations for thread messages with raw content and content-type tagging
// ABOUTME: Supports append-only user messages and in-place completion of streamed assistant replies
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{now_timestamp, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{ContentType, MessageContent, Sender};

impl Database {
    pub(super) async fn migrate_messages(&self) -> AppResult<()> {
        self.execute_schema(&[
            r"
            CREATE TABLE IF NOT EXISTS thread_messages (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL REFERENCES assistant_threads(id) ON DELETE CASCADE,
                external_message_id TEXT,
                sender TEXT NOT NULL CHECK (sender IN ('user', 'assistant')),
                content TEXT NOT NULL,
                content_type TEXT NOT NULL CHECK (content_type IN ('text', 'multipart')),
                is_complete INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_thread_messages_thread ON thread_messages(thread_id, created_at)",
        ])
        .await
    }
}

/// Database representation of a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Local message id
    pub id: String,
    /// Local thread id
    pub thread_id: String,
    /// External message id once known
    pub external_message_id: Option<String>,
    /// Author (`user` or `assistant`)
    pub sender: String,
    /// Raw content column
    pub content: String,
    /// Content-type tag (`text` or `multipart`)
    pub content_type: String,
    /// Completion flag
    pub is_complete: bool,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    /// Last update timestamp (RFC 3339)
    pub updated_at: String,
}

impl MessageRecord {
    /// Decode the stored content using its tag
    ///
    /// # Errors
    ///
    /// Returns an error if the tag is unknown or multi-part JSON is corrupt
    pub fn decoded_content(&self) -> AppResult<MessageContent> {
        MessageContent::from_raw(&self.content, self.content_type.parse()?)
    }
}

/// Message database operations manager
#[derive(Clone)]
pub struct MessageManager {
    pool: SqlitePool,
}

impl MessageManager {
    /// Create a new message manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a message to a thread
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the insert fails
    pub async fn insert_message(
        &self,
        thread_id: &str,
        sender: Sender,
        content: &MessageContent,
        external_message_id: Option<&str>,
        is_complete: bool,
    ) -> AppResult<MessageRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        let raw = content.to_raw()?;
        let content_type = content.content_type();

        sqlx::query(
            r"
            INSERT INTO thread_messages (id, thread_id, external_message_id, sender, content, content_type, is_complete, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            ",
        )
        .bind(&id)
        .bind(thread_id)
        .bind(external_message_id)
        .bind(sender.as_str())
        .bind(&raw)
        .bind(content_type.as_str())
        .bind(is_complete)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to insert message: {e}")))?;

        Ok(MessageRecord {
            id,
            thread_id: thread_id.to_owned(),
            external_message_id: external_message_id.map(ToOwned::to_owned),
            sender: sender.as_str().to_owned(),
            content: raw,
            content_type: content_type.as_str().to_owned(),
            is_complete,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Overwrite the text of a streamed assistant message and its completion state
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails or the message does not exist
    pub async fn update_assistant_message(
        &self,
        message_id: &str,
        text: &str,
        external_message_id: Option<&str>,
        is_complete: bool,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r"
            UPDATE thread_messages
            SET content = $1, content_type = 'text', external_message_id = COALESCE($2, external_message_id),
                is_complete = $3, updated_at = $4
            WHERE id = $5 AND sender = 'assistant'
            ",
        )
        .bind(text)
        .bind(external_message_id)
        .bind(is_complete)
        .bind(now_timestamp())
        .bind(message_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to update message: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Assistant message {message_id}")));
        }
        Ok(())
    }

    /// Messages of a thread in chronological order
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn list_messages(&self, thread_id: &str) -> AppResult<Vec<MessageRecord>> {
        let rows = sqlx::query(
            r"
            SELECT id, thread_id, external_message_id, sender, content, content_type, is_complete, created_at, updated_at
            FROM thread_messages
            WHERE thread_id = $1
            ORDER BY created_at ASC, rowid ASC
            ",
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list messages: {e}")))?;

        Ok(rows.iter().map(row_to_message).collect())
    }

    /// Get a single message
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_message(&self, message_id: &str) -> AppResult<Option<MessageRecord>> {
        let row = sqlx::query(
            r"
            SELECT id, thread_id, external_message_id, sender, content, content_type, is_complete, created_at, updated_at
            FROM thread_messages
            WHERE id = $1
            ",
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get message: {e}")))?;

        Ok(row.as_ref().map(row_to_message))
    }
}

fn row_to_message(row: &SqliteRow) -> MessageRecord {
    MessageRecord {
        id: row.get("id"),
        thread_id: row.get("thread_id"),
        external_message_id: row.get("external_message_id"),
        sender: row.get("sender"),
        content: row.get("content"),
        content_type: row.get("content_type"),
        is_complete: row.get("is_complete"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
