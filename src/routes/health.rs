// ABOUTME: Health check route for service monitoring and load balancers
// ABOUTME: Reports store reachability and the count of replies that could not be persisted
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};

use crate::resources::ServerResources;

/// Health routes implementation
pub struct HealthRoutes;

impl HealthRoutes {
    /// Create all health check routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/health", get(Self::health))
            .with_state(resources)
    }

    async fn health(State(resources): State<Arc<ServerResources>>) -> Json<serde_json::Value> {
        let database_ok = sqlx::query("SELECT 1")
            .execute(resources.database.pool())
            .await
            .is_ok();
        let metrics = resources.pipeline.metrics();

        Json(serde_json::json!({
            "status": if database_ok { "healthy" } else { "degraded" },
            "database": database_ok,
            "replies_stored": metrics.completed(),
            "replies_degraded": metrics.degraded(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    }
}
