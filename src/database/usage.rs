// ABOUTME: Database operations for per-user daily usage counters and per-user limit overrides
// ABOUTME: The increment is a single conditional upsert so concurrent callers can never exceed the limit
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use sqlx::SqlitePool;

use super::{now_timestamp, Database};
use crate::errors::{AppError, AppResult};

impl Database {
    pub(super) async fn migrate_usage(&self) -> AppResult<()> {
        self.execute_schema(&[
            r"
            CREATE TABLE IF NOT EXISTS usage_counters (
                user_id TEXT NOT NULL,
                period_start TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0 CHECK (count >= 0),
                resets_at TEXT NOT NULL,
                PRIMARY KEY (user_id, period_start)
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_usage_counters_resets_at ON usage_counters(resets_at)",
            r"
            CREATE TABLE IF NOT EXISTS usage_limits (
                user_id TEXT PRIMARY KEY,
                daily_limit INTEGER NOT NULL CHECK (daily_limit >= 0),
                updated_at TEXT NOT NULL
            )
            ",
        ])
        .await
    }
}

/// Usage counter operations manager
#[derive(Clone)]
pub struct UsageManager {
    pool: SqlitePool,
}

impl UsageManager {
    /// Create a new usage manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Count recorded for a user in a usage day
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_count(&self, user_id: &str, period_start: &str) -> AppResult<u32> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT count FROM usage_counters WHERE user_id = $1 AND period_start = $2",
        )
        .bind(user_id)
        .bind(period_start)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to read usage: {e}")))?;

        Ok(count.map_or(0, |c| u32::try_from(c).unwrap_or(u32::MAX)))
    }

    /// Increment the counter if it is below `daily_limit`
    ///
    /// Returns the new count, or `None` when the limit was already reached and
    /// nothing was written. Creation of the first record and the increment of
    /// an existing one happen in the same statement.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails
    pub async fn increment_if_below(
        &self,
        user_id: &str,
        period_start: &str,
        resets_at: &str,
        daily_limit: u32,
    ) -> AppResult<Option<u32>> {
        if daily_limit == 0 {
            return Ok(None);
        }

        let count: Option<i64> = sqlx::query_scalar(
            r"
            INSERT INTO usage_counters (user_id, period_start, count, resets_at)
            VALUES ($1, $2, 1, $3)
            ON CONFLICT(user_id, period_start) DO UPDATE
                SET count = usage_counters.count + 1
                WHERE usage_counters.count < $4
            RETURNING count
            ",
        )
        .bind(user_id)
        .bind(period_start)
        .bind(resets_at)
        .bind(i64::from(daily_limit))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to increment usage: {e}")))?;

        Ok(count.map(|c| u32::try_from(c).unwrap_or(u32::MAX)))
    }

    /// Delete counters whose reset instant is at or before `now`
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub async fn delete_expired(&self, now: &str) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM usage_counters WHERE resets_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to purge usage counters: {e}")))?;

        Ok(result.rows_affected())
    }

    /// Per-user limit override
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_limit_override(&self, user_id: &str) -> AppResult<Option<u32>> {
        let limit: Option<i64> =
            sqlx::query_scalar("SELECT daily_limit FROM usage_limits WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::database(format!("Failed to read usage limit: {e}")))?;

        Ok(limit.map(|l| u32::try_from(l).unwrap_or(0)))
    }

    /// Set a per-user limit override
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails
    pub async fn set_limit_override(&self, user_id: &str, daily_limit: u32) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO usage_limits (user_id, daily_limit, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT(user_id) DO UPDATE
                SET daily_limit = excluded.daily_limit, updated_at = excluded.updated_at
            ",
        )
        .bind(user_id)
        .bind(i64::from(daily_limit))
        .bind(now_timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to set usage limit: {e}")))?;

        Ok(())
    }
}
