// ABOUTME: HTTP route registering an uploaded local file under its external file id
// ABOUTME: Later message scans resolve the reference without creating a bare record
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use crate::auth::AuthenticatedUser;
use crate::errors::AppError;
use crate::resources::ServerResources;

/// Request to register a local file
#[derive(Debug, Deserialize)]
pub struct AttachFileRequest {
    /// Id assigned by local file storage
    pub local_file_id: String,
    /// Id assigned by the assistant service
    pub external_file_id: String,
}

/// File reference routes handler
pub struct FileRoutes;

impl FileRoutes {
    /// Create all file routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/files/references", post(Self::attach_local_file))
            .with_state(resources)
    }

    async fn attach_local_file(
        State(resources): State<Arc<ServerResources>>,
        user: AuthenticatedUser,
        Json(request): Json<AttachFileRequest>,
    ) -> Result<Response, AppError> {
        let reference = resources
            .files
            .attach_local_file(
                &request.local_file_id,
                &request.external_file_id,
                &user.user_id,
            )
            .await?;

        Ok((StatusCode::CREATED, Json(reference)).into_response())
    }
}
