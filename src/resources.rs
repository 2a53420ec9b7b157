// ABOUTME: Shared server resources built once at startup and handed to every route
// ABOUTME: Wires the store, the assistant client, and the collaborators into the domain services
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Server Resources
//!
//! Every collaborator is constructed here and injected into the services.
//! Nothing is looked up from global state at request time.

use std::sync::Arc;

use crate::assistant::AssistantClient;
use crate::catalog::{CatalogProvider, DatabaseCatalogProvider};
use crate::config::ServerConfig;
use crate::database::Database;
use crate::enrichment::{ProfileContextEnricher, ProfileEnricher};
use crate::services::{
    FileReconciler, MessagePipeline, RecommendationExtractor, ThreadLifecycle, UsageLimiter,
};

/// Centralized resource container for dependency injection
pub struct ServerResources {
    /// Local store
    pub database: Arc<Database>,
    /// Process configuration
    pub config: Arc<ServerConfig>,
    /// External assistant service
    pub assistant: Arc<dyn AssistantClient>,
    /// Thread lifecycle manager
    pub threads: ThreadLifecycle,
    /// Message pipeline
    pub pipeline: MessagePipeline,
    /// File reconciliation store
    pub files: FileReconciler,
    /// Usage limiter
    pub usage: Arc<UsageLimiter>,
    /// Recommendation extractor
    pub recommendations: RecommendationExtractor,
}

impl ServerResources {
    /// Build resources with the stock enricher and catalog provider
    #[must_use]
    pub fn new(
        database: Database,
        config: Arc<ServerConfig>,
        assistant: Arc<dyn AssistantClient>,
    ) -> Self {
        let enricher: Arc<dyn ProfileEnricher> =
            Arc::new(ProfileContextEnricher::new(database.catalog()));
        let catalog: Arc<dyn CatalogProvider> =
            Arc::new(DatabaseCatalogProvider::new(database.catalog()));
        Self::with_collaborators(database, config, assistant, enricher, catalog)
    }

    /// Build resources with explicit enrichment and catalog collaborators
    #[must_use]
    pub fn with_collaborators(
        database: Database,
        config: Arc<ServerConfig>,
        assistant: Arc<dyn AssistantClient>,
        enricher: Arc<dyn ProfileEnricher>,
        catalog: Arc<dyn CatalogProvider>,
    ) -> Self {
        let threads = ThreadLifecycle::new(Arc::clone(&assistant), database.threads());
        let files = FileReconciler::new(database.attachments());
        let usage = Arc::new(UsageLimiter::new(database.usage(), config.usage.clone()));

        let pipeline = MessagePipeline::new(
            Arc::clone(&assistant),
            threads.clone(),
            Arc::clone(&usage),
            enricher,
            files.clone(),
            database.messages(),
            config.pipeline.clone(),
        );

        let recommendations = RecommendationExtractor::new(
            Arc::clone(&assistant),
            threads.clone(),
            Arc::clone(&usage),
            catalog,
            config.recommendations.clone(),
        );

        Self {
            database: Arc::new(database),
            config,
            assistant,
            threads,
            pipeline,
            files,
            usage,
            recommendations,
        }
    }
}
