// ABOUTME: Route module organization for the skincare assistant HTTP endpoints
// ABOUTME: Merges the domain routers and applies tracing and CORS layers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Route module
//!
//! Each domain module contains only route definitions and thin handler
//! functions that delegate to the service layer.

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::resources::ServerResources;

/// File reference registration
pub mod files;
/// Health check
pub mod health;
/// Threads, messages, and recommendations
pub mod threads;
/// Daily usage
pub mod usage;

pub use files::FileRoutes;
pub use health::HealthRoutes;
pub use threads::ThreadRoutes;
pub use usage::UsageRoutes;

/// Full application router
pub fn router(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .merge(HealthRoutes::routes(Arc::clone(&resources)))
        .merge(ThreadRoutes::routes(Arc::clone(&resources)))
        .merge(UsageRoutes::routes(Arc::clone(&resources)))
        .merge(FileRoutes::routes(resources))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
