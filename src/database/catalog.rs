// ABOUTME: Read access to the product catalog and stored user skin profiles
// ABOUTME: Tables are owned by the product and profile services; this side only reads and seeds tests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use sqlx::{Row, SqlitePool};

use super::{now_timestamp, Database};
use crate::errors::{AppError, AppResult};
use crate::models::CatalogItem;

impl Database {
    pub(super) async fn migrate_catalog(&self) -> AppResult<()> {
        self.execute_schema(&[
            r"
            CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                category TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_products_active ON products(is_active)",
            r"
            CREATE TABLE IF NOT EXISTS user_profiles (
                user_id TEXT PRIMARY KEY,
                profile_data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        ])
        .await
    }
}

/// Catalog and profile reader
#[derive(Clone)]
pub struct CatalogManager {
    pool: SqlitePool,
}

impl CatalogManager {
    /// Create a new catalog manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Active products ordered by name
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn active_products(&self) -> AppResult<Vec<CatalogItem>> {
        let rows = sqlx::query(
            r"
            SELECT id, name, description, category
            FROM products
            WHERE is_active = 1
            ORDER BY name ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to load catalog: {e}")))?;

        Ok(rows
            .iter()
            .map(|r| CatalogItem {
                id: r.get("id"),
                name: r.get("name"),
                description: r.get("description"),
                category: r.get("category"),
            })
            .collect())
    }

    /// Insert or replace a product row
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails
    pub async fn upsert_product(&self, item: &CatalogItem, is_active: bool) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO products (id, name, description, category, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT(id) DO UPDATE
                SET name = excluded.name, description = excluded.description,
                    category = excluded.category, is_active = excluded.is_active
            ",
        )
        .bind(&item.id)
        .bind(&item.name)
        .bind(item.description.as_deref())
        .bind(item.category.as_deref())
        .bind(is_active)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to upsert product: {e}")))?;
        Ok(())
    }

    /// Stored profile JSON for a user
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored value is not JSON
    pub async fn get_profile(&self, user_id: &str) -> AppResult<Option<serde_json::Value>> {
        let data: Option<String> =
            sqlx::query_scalar("SELECT profile_data FROM user_profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::database(format!("Failed to load profile: {e}")))?;

        data.map(|d| serde_json::from_str(&d).map_err(AppError::from))
            .transpose()
    }

    /// Insert or replace a user's profile JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails
    pub async fn upsert_profile(&self, user_id: &str, profile: &serde_json::Value) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO user_profiles (user_id, profile_data, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT(user_id) DO UPDATE
                SET profile_data = excluded.profile_data, updated_at = excluded.updated_at
            ",
        )
        .bind(user_id)
        .bind(profile.to_string())
        .bind(now_timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to save profile: {e}")))?;
        Ok(())
    }
}
