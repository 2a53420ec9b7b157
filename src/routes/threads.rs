// ABOUTME: HTTP routes for conversation threads, their messages, and product recommendations
// ABOUTME: Message sends answer with an SSE stream fed by the message pipeline
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Thread routes
//!
//! Handlers only extract the caller and request, then delegate to the
//! services held by [`ServerResources`].

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::auth::AuthenticatedUser;
use crate::errors::AppError;
use crate::models::{Message, MessageContent, NewThread, Thread};
use crate::resources::ServerResources;
use crate::services::PipelineEvent;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing threads
#[derive(Debug, Deserialize, Default)]
pub struct ListThreadsQuery {
    /// Maximum number of threads to return
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Offset for pagination
    #[serde(default)]
    pub offset: i64,
}

const fn default_limit() -> i64 {
    20
}

/// Threads of the caller
#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadListResponse {
    /// Threads, most recently active first
    pub threads: Vec<Thread>,
    /// Number of threads returned
    pub total: usize,
}

/// Request to send a message
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Plain text or ordered content parts
    pub content: MessageContent,
}

/// Messages of a thread
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageListResponse {
    /// Messages, oldest first
    pub messages: Vec<Message>,
}

/// Ownership check result
#[derive(Debug, Serialize, Deserialize)]
pub struct OwnershipResponse {
    /// Whether the caller owns the thread
    pub is_owner: bool,
}

/// Request for product recommendations
#[derive(Debug, Default, Deserialize)]
pub struct RecommendationRequest {
    /// Maximum number of products to return
    #[serde(default)]
    pub max_items: Option<usize>,
}

/// Recommended product ids
#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendationResponse {
    /// Catalog ids in the order the assistant ranked them
    pub product_ids: Vec<String>,
}

// ============================================================================
// Thread Routes
// ============================================================================

/// Thread routes handler
pub struct ThreadRoutes;

impl ThreadRoutes {
    /// Create all thread routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/api/threads",
                post(Self::create_thread).get(Self::list_threads),
            )
            .route(
                "/api/threads/:thread_id",
                get(Self::get_thread).delete(Self::delete_thread),
            )
            .route("/api/threads/:thread_id/owner", get(Self::check_owner))
            .route(
                "/api/threads/:thread_id/messages",
                post(Self::send_message).get(Self::list_messages),
            )
            .route(
                "/api/threads/:thread_id/recommendations",
                post(Self::recommend),
            )
            .with_state(resources)
    }

    async fn create_thread(
        State(resources): State<Arc<ServerResources>>,
        user: AuthenticatedUser,
        request: Option<Json<NewThread>>,
    ) -> Result<Response, AppError> {
        let new_thread = request.map(|Json(body)| body).unwrap_or_default();
        let thread = resources
            .threads
            .create_thread(&user.user_id, &new_thread)
            .await?;

        Ok((StatusCode::CREATED, Json(thread)).into_response())
    }

    async fn list_threads(
        State(resources): State<Arc<ServerResources>>,
        user: AuthenticatedUser,
        Query(query): Query<ListThreadsQuery>,
    ) -> Result<Response, AppError> {
        let threads = resources
            .threads
            .list_threads(&user.user_id, query.limit, query.offset)
            .await?;

        let total = threads.len();
        Ok((StatusCode::OK, Json(ThreadListResponse { threads, total })).into_response())
    }

    async fn get_thread(
        State(resources): State<Arc<ServerResources>>,
        user: AuthenticatedUser,
        Path(thread_id): Path<String>,
    ) -> Result<Response, AppError> {
        resources.threads.authorize(&thread_id, &user.user_id).await?;
        let details = resources.threads.retrieve_thread(&thread_id).await?;

        Ok((StatusCode::OK, Json(details)).into_response())
    }

    async fn delete_thread(
        State(resources): State<Arc<ServerResources>>,
        user: AuthenticatedUser,
        Path(thread_id): Path<String>,
    ) -> Result<Response, AppError> {
        resources
            .threads
            .delete_thread(&thread_id, &user.user_id)
            .await?;

        Ok(StatusCode::NO_CONTENT.into_response())
    }

    async fn check_owner(
        State(resources): State<Arc<ServerResources>>,
        user: AuthenticatedUser,
        Path(thread_id): Path<String>,
    ) -> Result<Response, AppError> {
        let is_owner = resources
            .threads
            .is_owner(&thread_id, &user.user_id)
            .await?;

        Ok((StatusCode::OK, Json(OwnershipResponse { is_owner })).into_response())
    }

    async fn list_messages(
        State(resources): State<Arc<ServerResources>>,
        user: AuthenticatedUser,
        Path(thread_id): Path<String>,
    ) -> Result<Response, AppError> {
        let messages = resources
            .pipeline
            .list_messages(&thread_id, &user.user_id)
            .await?;

        Ok((StatusCode::OK, Json(MessageListResponse { messages })).into_response())
    }

    /// Send a message and stream the reply via SSE
    async fn send_message(
        State(resources): State<Arc<ServerResources>>,
        user: AuthenticatedUser,
        Path(thread_id): Path<String>,
        Json(request): Json<SendMessageRequest>,
    ) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
        let mut events = resources
            .pipeline
            .send_message(&thread_id, &user.user_id, request.content)
            .await?;

        info!(thread_id = %thread_id, user_id = %user.user_id, "Streaming reply");

        let stream = async_stream::stream! {
            while let Some(event) = events.next().await {
                yield Ok(to_sse_event(&event));
            }
            debug!(thread_id = %thread_id, "Reply stream closed");
        };

        Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
    }

    async fn recommend(
        State(resources): State<Arc<ServerResources>>,
        user: AuthenticatedUser,
        Path(thread_id): Path<String>,
        request: Option<Json<RecommendationRequest>>,
    ) -> Result<Response, AppError> {
        let request = request.map(|Json(body)| body).unwrap_or_default();
        let product_ids = resources
            .recommendations
            .recommend(&thread_id, &user.user_id, request.max_items)
            .await?;

        Ok((StatusCode::OK, Json(RecommendationResponse { product_ids })).into_response())
    }
}

/// SSE frame named after the event type, carrying the event as JSON
fn to_sse_event(event: &PipelineEvent) -> Event {
    let name = match event {
        PipelineEvent::UserMessage { .. } => "user_message",
        PipelineEvent::Delta { .. } => "delta",
        PipelineEvent::Done { .. } => "done",
        PipelineEvent::Error { .. } => "error",
    };
    let data = serde_json::to_string(event).unwrap_or_else(|e| {
        format!(r#"{{"type":"error","code":"internalError","message":"{e}"}}"#)
    });
    Event::default().event(name).data(data)
}
