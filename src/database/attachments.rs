// ABOUTME: Database operations for file cross-references between local storage and the assistant service
// ABOUTME: Idempotent upserts keyed on the external file id plus lookup of files linked to a message
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{now_timestamp, Database};
use crate::errors::{AppError, AppResult};
use crate::models::AttachmentReference;

impl Database {
    pub(super) async fn migrate_attachments(&self) -> AppResult<()> {
        self.execute_schema(&[
            r"
            CREATE TABLE IF NOT EXISTS file_references (
                id TEXT PRIMARY KEY,
                external_file_id TEXT NOT NULL UNIQUE,
                local_file_id TEXT,
                owner_id TEXT,
                message_id TEXT REFERENCES thread_messages(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_file_references_message ON file_references(message_id)",
        ])
        .await
    }
}

/// File cross-reference operations manager
#[derive(Clone)]
pub struct AttachmentManager {
    pool: SqlitePool,
}

impl AttachmentManager {
    /// Create a new attachment manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Ensure a record exists for `external_file_id` and point it at `message_id`
    ///
    /// Repeating the call with the same pair leaves exactly one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails
    pub async fn link_or_create(
        &self,
        external_file_id: &str,
        message_id: &str,
    ) -> AppResult<AttachmentReference> {
        let now = now_timestamp();
        let row = sqlx::query(
            r"
            INSERT INTO file_references (id, external_file_id, message_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT(external_file_id) DO UPDATE
                SET message_id = excluded.message_id, updated_at = excluded.updated_at
            RETURNING id, external_file_id, local_file_id, owner_id, message_id, created_at
            ",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(external_file_id)
        .bind(message_id)
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to link file reference: {e}")))?;

        Ok(row_to_reference(&row))
    }

    /// Record which local file an external file id came from
    ///
    /// An existing reference is only updated when it has no owner yet or
    /// already belongs to `owner_id`. Returns `None` when another user owns it.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails
    pub async fn attach_local_file(
        &self,
        local_file_id: &str,
        external_file_id: &str,
        owner_id: &str,
    ) -> AppResult<Option<AttachmentReference>> {
        let now = now_timestamp();
        let row = sqlx::query(
            r"
            INSERT INTO file_references (id, external_file_id, local_file_id, owner_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT(external_file_id) DO UPDATE
                SET local_file_id = excluded.local_file_id,
                    owner_id = excluded.owner_id,
                    updated_at = excluded.updated_at
                WHERE file_references.owner_id IS NULL
                   OR file_references.owner_id = excluded.owner_id
            RETURNING id, external_file_id, local_file_id, owner_id, message_id, created_at
            ",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(external_file_id)
        .bind(local_file_id)
        .bind(owner_id)
        .bind(&now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to attach local file: {e}")))?;

        Ok(row.as_ref().map(row_to_reference))
    }

    /// Look up a reference by external file id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_by_external_id(
        &self,
        external_file_id: &str,
    ) -> AppResult<Option<AttachmentReference>> {
        let row = sqlx::query(
            r"
            SELECT id, external_file_id, local_file_id, owner_id, message_id, created_at
            FROM file_references
            WHERE external_file_id = $1
            ",
        )
        .bind(external_file_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get file reference: {e}")))?;

        Ok(row.as_ref().map(row_to_reference))
    }

    /// References linked to a message
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn find_by_message(&self, message_id: &str) -> AppResult<Vec<AttachmentReference>> {
        let rows = sqlx::query(
            r"
            SELECT id, external_file_id, local_file_id, owner_id, message_id, created_at
            FROM file_references
            WHERE message_id = $1
            ORDER BY created_at ASC
            ",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list file references: {e}")))?;

        Ok(rows.iter().map(row_to_reference).collect())
    }

    /// References linked to any message of a thread
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn find_by_thread(&self, thread_id: &str) -> AppResult<Vec<AttachmentReference>> {
        let rows = sqlx::query(
            r"
            SELECT f.id, f.external_file_id, f.local_file_id, f.owner_id, f.message_id, f.created_at
            FROM file_references f
            JOIN thread_messages m ON m.id = f.message_id
            WHERE m.thread_id = $1
            ORDER BY f.created_at ASC
            ",
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list thread file references: {e}")))?;

        Ok(rows.iter().map(row_to_reference).collect())
    }

    /// Number of references for an external file id (0 or 1)
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn count_for_external_id(&self, external_file_id: &str) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM file_references WHERE external_file_id = $1")
            .bind(external_file_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to count file references: {e}")))
    }
}

fn row_to_reference(row: &SqliteRow) -> AttachmentReference {
    AttachmentReference {
        id: row.get("id"),
        external_file_id: row.get("external_file_id"),
        local_file_id: row.get("local_file_id"),
        owner_id: row.get("owner_id"),
        message_id: row.get("message_id"),
        created_at: row.get("created_at"),
    }
}
