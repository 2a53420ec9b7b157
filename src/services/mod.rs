// ABOUTME: Domain service layer holding the orchestrator's business rules
// ABOUTME: Services are transport-agnostic and receive their collaborators at construction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Domain service layer
//!
//! Route handlers stay thin: they extract the caller and the path, then
//! delegate to one of these services.

/// Thread create, retrieve, delete, and ownership checks
pub mod thread_lifecycle;

/// Send a message and stream the assistant reply
pub mod message_pipeline;

/// External file id cross-references
pub mod file_reconciliation;

/// Daily usage quota
pub mod usage_limiter;

/// Product recommendations from the assistant
pub mod recommendations;

pub use file_reconciliation::FileReconciler;
pub use message_pipeline::{MessagePipeline, PipelineEvent, PipelineMetrics, PipelineStream};
pub use recommendations::RecommendationExtractor;
pub use thread_lifecycle::{validate_thread_id, ThreadDetails, ThreadLifecycle};
pub use usage_limiter::{UsageLimiter, UsagePeriod};
