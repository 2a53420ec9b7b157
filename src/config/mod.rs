// ABOUTME: Configuration module root
// ABOUTME: Re-exports the environment-driven server configuration types
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Environment-based configuration
pub mod environment;

pub use environment::{
    AssistantConfig, AuthConfig, PipelineConfig, RecommendationConfig, ServerConfig, UsageConfig,
};
