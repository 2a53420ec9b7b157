// ABOUTME: Catalog provider collaborator listing products that may be recommended
// ABOUTME: Default implementation reads active rows from the products table
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use async_trait::async_trait;

use crate::database::CatalogManager;
use crate::errors::AppResult;
use crate::models::CatalogItem;

/// Source of active catalog items
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Items currently eligible for recommendation
    async fn active_items(&self) -> AppResult<Vec<CatalogItem>>;
}

/// Catalog backed by the local `products` table
pub struct DatabaseCatalogProvider {
    catalog: CatalogManager,
}

impl DatabaseCatalogProvider {
    /// Create a provider over the products table
    #[must_use]
    pub const fn new(catalog: CatalogManager) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl CatalogProvider for DatabaseCatalogProvider {
    async fn active_items(&self) -> AppResult<Vec<CatalogItem>> {
        self.catalog.active_products().await
    }
}
