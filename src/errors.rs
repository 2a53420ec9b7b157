// ABOUTME: Unified error type with stable machine-readable reason codes for every failure
// ABOUTME: Maps error codes to HTTP status and renders the JSON error body returned to clients
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Unified Error Handling
//!
//! Every fallible operation in the orchestrator returns [`AppResult`]. Each
//! [`AppError`] carries an [`ErrorCode`] whose serialized form is the stable
//! reason code clients branch on (`threadNotFound`, `dailyLimitExceeded`, ...),
//! plus a human readable message.

use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

/// Stable reason codes surfaced to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    // Authentication
    /// No authenticated user was supplied with the request
    AuthRequired,

    // Bad request
    /// Generic malformed input
    InvalidInput,
    /// Thread id is not a well-formed local identifier
    InvalidThreadId,
    /// No active catalog items to recommend from
    EmptyCatalog,
    /// Model reply did not contain a parseable id array
    InvalidRecommendationFormat,

    // Not found
    /// Thread missing locally or on the external service
    ThreadNotFound,
    /// Any other missing resource
    ResourceNotFound,

    // Forbidden
    /// Caller is not the owner of the thread
    ThreadPermissionDenied,
    /// File reference is registered to another user
    FilePermissionDenied,
    /// Caller exhausted the daily usage quota
    DailyLimitExceeded,

    // Upstream
    /// Submitting or streaming a message failed
    MessageSendFailed,
    /// A polled run ended in a terminal failure state
    RunFailed,
    /// A polled run did not finish within the allowed attempts
    RunTimedOut,
    /// External service call failed
    UpstreamFailure,

    // Internal
    /// Local store write or read failed
    PersistenceFailure,
    /// Configuration is missing or invalid
    ConfigError,
    /// Serialization or deserialization failed
    SerializationError,
    /// Unclassified internal failure
    InternalError,
}

/// Coarse failure taxonomy shared by all reason codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Request lacks an authenticated caller
    Unauthorized,
    /// Malformed or unsatisfiable request
    BadRequest,
    /// Resource does not exist
    NotFound,
    /// Caller may not perform the action
    Forbidden,
    /// External model service failed
    UpstreamFailure,
    /// Local storage failed
    PersistenceFailure,
    /// Anything else
    Internal,
}

impl ErrorCode {
    /// Category this reason code belongs to
    #[must_use]
    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::AuthRequired => ErrorCategory::Unauthorized,
            Self::InvalidInput
            | Self::InvalidThreadId
            | Self::EmptyCatalog
            | Self::InvalidRecommendationFormat => ErrorCategory::BadRequest,
            Self::ThreadNotFound | Self::ResourceNotFound => ErrorCategory::NotFound,
            Self::ThreadPermissionDenied
            | Self::FilePermissionDenied
            | Self::DailyLimitExceeded => ErrorCategory::Forbidden,
            Self::MessageSendFailed
            | Self::RunFailed
            | Self::RunTimedOut
            | Self::UpstreamFailure => ErrorCategory::UpstreamFailure,
            Self::PersistenceFailure => ErrorCategory::PersistenceFailure,
            Self::ConfigError | Self::SerializationError | Self::InternalError => {
                ErrorCategory::Internal
            }
        }
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(self) -> StatusCode {
        match self {
            Self::AuthRequired => StatusCode::UNAUTHORIZED,
            Self::InvalidInput
            | Self::InvalidThreadId
            | Self::EmptyCatalog
            | Self::InvalidRecommendationFormat => StatusCode::BAD_REQUEST,
            Self::ThreadNotFound | Self::ResourceNotFound => StatusCode::NOT_FOUND,
            Self::ThreadPermissionDenied
            | Self::FilePermissionDenied
            | Self::DailyLimitExceeded => StatusCode::FORBIDDEN,
            Self::RunTimedOut => StatusCode::GATEWAY_TIMEOUT,
            Self::MessageSendFailed
            | Self::RunFailed
            | Self::UpstreamFailure => StatusCode::BAD_GATEWAY,
            Self::PersistenceFailure
            | Self::ConfigError
            | Self::SerializationError
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a user-friendly description of this error
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::AuthRequired => "Authentication is required to access this resource",
            Self::InvalidInput => "The request contains invalid input",
            Self::InvalidThreadId => "The thread identifier is malformed",
            Self::EmptyCatalog => "No active products are available for recommendation",
            Self::ThreadNotFound => "The requested thread was not found",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::ThreadPermissionDenied => "You do not have permission to access this thread",
            Self::FilePermissionDenied => "The file is registered to another user",
            Self::DailyLimitExceeded => "Daily usage limit exceeded",
            Self::MessageSendFailed => "Failed to send message to the assistant",
            Self::RunFailed => "The assistant run failed",
            Self::RunTimedOut => "The assistant run did not complete in time",
            Self::InvalidRecommendationFormat => "The assistant returned an unparseable recommendation",
            Self::UpstreamFailure => "The assistant service request failed",
            Self::PersistenceFailure => "Failed to persist data",
            Self::ConfigError => "Configuration error",
            Self::SerializationError => "Data serialization/deserialization failed",
            Self::InternalError => "An internal server error occurred",
        }
    }
}

/// Unified error type for the application
#[derive(Debug, Error)]
#[error("{}: {}", .code.description(), .message)]
pub struct AppError {
    /// Stable reason code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Category of this error
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Authentication required
    pub fn auth_required() -> Self {
        Self::new(ErrorCode::AuthRequired, "Missing authenticated user")
    }

    /// Invalid input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Malformed thread id
    pub fn invalid_thread_id(thread_id: &str) -> Self {
        Self::new(
            ErrorCode::InvalidThreadId,
            format!("'{thread_id}' is not a valid thread id"),
        )
    }

    /// Thread not found locally or externally
    pub fn thread_not_found(thread_id: &str) -> Self {
        Self::new(
            ErrorCode::ThreadNotFound,
            format!("Thread {thread_id} not found"),
        )
    }

    /// Generic resource not found
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Caller does not own the thread
    pub fn thread_permission_denied(thread_id: &str) -> Self {
        Self::new(
            ErrorCode::ThreadPermissionDenied,
            format!("Not the owner of thread {thread_id}"),
        )
    }

    /// External file id already belongs to another user
    pub fn file_permission_denied(external_file_id: &str) -> Self {
        Self::new(
            ErrorCode::FilePermissionDenied,
            format!("File {external_file_id} is registered to another user"),
        )
    }

    /// Daily quota exhausted
    pub fn daily_limit_exceeded(limit: u32) -> Self {
        Self::new(
            ErrorCode::DailyLimitExceeded,
            format!("Daily limit of {limit} requests reached"),
        )
    }

    /// Message submission or streaming failed
    pub fn message_send_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MessageSendFailed, message)
    }

    /// External service error
    pub fn external_service(service: &str, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::UpstreamFailure,
            format!("{service}: {}", message.into()),
        )
    }

    /// Local store failure
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PersistenceFailure, message)
    }

    /// Configuration failure
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

/// HTTP error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error body
    pub error: ErrorResponseDetails,
}

/// Code and message pair inside [`ErrorResponse`]
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponseDetails {
    /// Stable reason code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        let message = match error.category() {
            // Storage and internal details stay in the logs
            ErrorCategory::PersistenceFailure | ErrorCategory::Internal => {
                error.code.description().to_owned()
            }
            _ => error.message.clone(),
        };
        Self {
            error: ErrorResponseDetails {
                code: error.code,
                message,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        if status.is_server_error() {
            error!(code = ?self.code, error = %self, "request failed");
        } else {
            debug!(code = ?self.code, error = %self, "request rejected");
        }
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        Self::database(format!("Database error: {error}")).with_source(error)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(ErrorCode::SerializationError, error.to_string()).with_source(error)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(format!("{error:#}"))
    }
}
