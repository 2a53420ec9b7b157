// ABOUTME: SQLite database bootstrap, connection pool setup, and schema migrations
// ABOUTME: Owns the pool shared by thread, message, attachment, usage, and catalog stores
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Database
//!
//! Every store takes a clone of the same [`SqlitePool`]. Statements borrow a
//! connection per query and never hold one across an `.await` on another
//! query, so a single-connection pool (used for in-memory databases) cannot
//! deadlock.

/// File cross-reference storage
pub mod attachments;
/// Read-only access to the product catalog and user profiles
pub mod catalog;
/// Message storage
pub mod messages;
/// Thread storage
pub mod threads;
/// Daily usage counters
pub mod usage;

pub use attachments::AttachmentManager;
pub use catalog::CatalogManager;
pub use messages::{MessageManager, MessageRecord};
pub use threads::ThreadManager;
pub use usage::UsageManager;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::errors::{AppError, AppResult};

/// Connection pool plus migrations
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the connection fails, or a
    /// migration statement fails
    pub async fn new(database_url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::config(format!("Invalid DATABASE_URL '{database_url}': {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // In-memory databases exist per connection and vanish with it
        let in_memory = database_url.contains(":memory:");
        let max_connections = if in_memory { 1 } else { 10 };

        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| AppError::database(format!("Failed to connect to database: {e}")))?;

        let db = Self { pool };
        db.migrate().await?;

        info!(max_connections, "Database initialized");
        Ok(db)
    }

    /// Get a reference to the database pool
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run database migrations
    ///
    /// # Errors
    ///
    /// Returns an error if any schema statement fails
    pub async fn migrate(&self) -> AppResult<()> {
        self.migrate_threads().await?;
        self.migrate_messages().await?;
        self.migrate_attachments().await?;
        self.migrate_usage().await?;
        self.migrate_catalog().await?;
        Ok(())
    }

    /// Thread store
    #[must_use]
    pub fn threads(&self) -> ThreadManager {
        ThreadManager::new(self.pool.clone())
    }

    /// Message store
    #[must_use]
    pub fn messages(&self) -> MessageManager {
        MessageManager::new(self.pool.clone())
    }

    /// Attachment cross-reference store
    #[must_use]
    pub fn attachments(&self) -> AttachmentManager {
        AttachmentManager::new(self.pool.clone())
    }

    /// Usage counter store
    #[must_use]
    pub fn usage(&self) -> UsageManager {
        UsageManager::new(self.pool.clone())
    }

    /// Catalog and profile reader
    #[must_use]
    pub fn catalog(&self) -> CatalogManager {
        CatalogManager::new(self.pool.clone())
    }

    /// Run a list of schema statements in order
    async fn execute_schema(&self, statements: &[&str]) -> AppResult<()> {
        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::database(format!("Migration failed: {e}")))?;
        }
        Ok(())
    }
}

/// Timestamp format used by every table; fixed width so text comparison orders correctly
pub(crate) fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time in the stored format
pub(crate) fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}
