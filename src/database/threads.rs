// ABOUTME: Database operations for conversation threads bound to external assistant threads
// ABOUTME: Handles create, lookup, owner listing, one-time naming, and deletion with message cascade
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{now_timestamp, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{NewThread, Thread};

impl Database {
    pub(super) async fn migrate_threads(&self) -> AppResult<()> {
        self.execute_schema(&[
            r"
            CREATE TABLE IF NOT EXISTS assistant_threads (
                id TEXT PRIMARY KEY,
                external_thread_id TEXT NOT NULL UNIQUE,
                owner_id TEXT NOT NULL,
                name TEXT,
                description TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_assistant_threads_owner ON assistant_threads(owner_id, updated_at)",
        ])
        .await
    }
}

/// Thread database operations manager
#[derive(Clone)]
pub struct ThreadManager {
    pool: SqlitePool,
}

impl ThreadManager {
    /// Create a new thread manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert the local record for an already created external thread
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn create_thread(
        &self,
        external_thread_id: &str,
        owner_id: &str,
        new_thread: &NewThread,
    ) -> AppResult<Thread> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        let metadata = new_thread
            .metadata
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));

        sqlx::query(
            r"
            INSERT INTO assistant_threads (id, external_thread_id, owner_id, name, description, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            ",
        )
        .bind(&id)
        .bind(external_thread_id)
        .bind(owner_id)
        .bind(new_thread.name.as_deref())
        .bind(new_thread.description.as_deref())
        .bind(metadata.to_string())
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create thread: {e}")))?;

        Ok(Thread {
            id,
            external_thread_id: external_thread_id.to_owned(),
            owner_id: owner_id.to_owned(),
            name: new_thread.name.clone(),
            description: new_thread.description.clone(),
            metadata,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get a thread by local id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_thread(&self, thread_id: &str) -> AppResult<Option<Thread>> {
        let row = sqlx::query(
            r"
            SELECT id, external_thread_id, owner_id, name, description, metadata, created_at, updated_at
            FROM assistant_threads
            WHERE id = $1
            ",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get thread: {e}")))?;

        Ok(row.as_ref().map(row_to_thread))
    }

    /// Owner of a thread, `None` when the thread does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_owner(&self, thread_id: &str) -> AppResult<Option<String>> {
        sqlx::query_scalar("SELECT owner_id FROM assistant_threads WHERE id = $1")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to get thread owner: {e}")))
    }

    /// List a user's threads, most recently updated first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn list_threads(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Thread>> {
        let rows = sqlx::query(
            r"
            SELECT id, external_thread_id, owner_id, name, description, metadata, created_at, updated_at
            FROM assistant_threads
            WHERE owner_id = $1
            ORDER BY updated_at DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list threads: {e}")))?;

        Ok(rows.iter().map(row_to_thread).collect())
    }

    /// Set the thread name unless one is already present
    ///
    /// Returns `true` if this call set the name.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn set_name_if_unset(&self, thread_id: &str, name: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE assistant_threads
            SET name = $1, updated_at = $2
            WHERE id = $3 AND name IS NULL
            ",
        )
        .bind(name)
        .bind(now_timestamp())
        .bind(thread_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to name thread: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Bump `updated_at` after activity in the thread
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn touch(&self, thread_id: &str) -> AppResult<()> {
        sqlx::query("UPDATE assistant_threads SET updated_at = $1 WHERE id = $2")
            .bind(now_timestamp())
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to update thread: {e}")))?;
        Ok(())
    }

    /// Delete a thread; its messages go with it
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub async fn delete_thread(&self, thread_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM assistant_threads WHERE id = $1")
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete thread: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_thread(row: &SqliteRow) -> Thread {
    let metadata: String = row.get("metadata");
    Thread {
        id: row.get("id"),
        external_thread_id: row.get("external_thread_id"),
        owner_id: row.get("owner_id"),
        name: row.get("name"),
        description: row.get("description"),
        metadata: serde_json::from_str(&metadata).unwrap_or_else(|_| serde_json::json!({})),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
