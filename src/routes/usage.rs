// ABOUTME: HTTP routes exposing the caller's daily usage and the explicit increment operation
// ABOUTME: A denied increment answers with the dailyLimitExceeded reason code
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedUser;
use crate::errors::AppError;
use crate::resources::ServerResources;

/// Result of a successful increment
#[derive(Debug, Serialize, Deserialize)]
pub struct IncrementResponse {
    /// Count after the increment
    pub count: u32,
    /// Limit in force
    pub limit: u32,
}

/// Usage routes handler
pub struct UsageRoutes;

impl UsageRoutes {
    /// Create all usage routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/usage", get(Self::get_usage))
            .route("/api/usage/increment", post(Self::increment))
            .with_state(resources)
    }

    async fn get_usage(
        State(resources): State<Arc<ServerResources>>,
        user: AuthenticatedUser,
    ) -> Result<Response, AppError> {
        let snapshot = resources.usage.snapshot(&user.user_id).await?;
        Ok((StatusCode::OK, Json(snapshot)).into_response())
    }

    async fn increment(
        State(resources): State<Arc<ServerResources>>,
        user: AuthenticatedUser,
    ) -> Result<Response, AppError> {
        let limit = resources.usage.daily_limit_for(&user.user_id).await?;
        let count = resources.usage.authorize(&user.user_id).await?;
        Ok((StatusCode::OK, Json(IncrementResponse { count, limit })).into_response())
    }
}
