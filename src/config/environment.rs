// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Loads .env, parses typed sections for the assistant, usage quota, pipeline, and recommendations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Environment-based configuration management for production deployment

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::{defaults, env_vars, pipeline, recommendations, usage};

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Database connection string
    pub database_url: String,
    /// External assistant service
    pub assistant: AssistantConfig,
    /// Daily usage quota
    pub usage: UsageConfig,
    /// Message pipeline tuning
    pub pipeline: PipelineConfig,
    /// Recommendation extraction tuning
    pub recommendations: RecommendationConfig,
    /// Trusted authentication header
    pub auth: AuthConfig,
}

/// External assistant service settings
#[derive(Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// API base URL
    pub base_url: String,
    /// Bearer API key
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Assistant that runs are started against
    pub assistant_id: String,
    /// Model used for title summarization
    pub title_model: String,
}

impl std::fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("assistant_id", &self.assistant_id)
            .field("title_model", &self.title_model)
            .finish()
    }
}

/// Daily usage quota settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    /// Limit applied when a user has no override
    pub default_daily_limit: u32,
    /// UTC hour at which the usage day rolls over
    pub reset_hour_utc: u32,
    /// Interval of the background purge task
    pub purge_interval_secs: u64,
}

/// Message pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Budget for profile enrichment
    pub enrichment_timeout_ms: u64,
    /// Generate a title for unnamed threads after the first reply
    pub auto_name_threads: bool,
}

impl PipelineConfig {
    /// Enrichment budget as a `Duration`
    #[must_use]
    pub const fn enrichment_timeout(&self) -> Duration {
        Duration::from_millis(self.enrichment_timeout_ms)
    }
}

/// Recommendation extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    /// Delay between run status polls
    pub poll_interval_ms: u64,
    /// Polls before the run is considered timed out
    pub max_poll_attempts: u32,
    /// Default maximum number of ids returned
    pub default_max_items: usize,
}

impl RecommendationConfig {
    /// Poll interval as a `Duration`
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Trusted header carrying the authenticated user id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Header name, lowercase
    pub user_id_header: String,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            default_daily_limit: usage::DEFAULT_DAILY_LIMIT,
            reset_hour_utc: usage::DEFAULT_RESET_HOUR_UTC,
            purge_interval_secs: usage::DEFAULT_PURGE_INTERVAL_SECS,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enrichment_timeout_ms: pipeline::DEFAULT_ENRICHMENT_TIMEOUT_MS,
            auto_name_threads: true,
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: recommendations::DEFAULT_POLL_INTERVAL_MS,
            max_poll_attempts: recommendations::DEFAULT_MAX_POLL_ATTEMPTS,
            default_max_items: recommendations::DEFAULT_MAX_ITEMS,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            user_id_header: defaults::USER_ID_HEADER.to_owned(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed, or if
    /// validation fails
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        if let Err(e) = dotenvy::dotenv() {
            warn!("No .env file found or failed to load: {}", e);
        }

        let config = Self {
            http_port: env_var_or(env_vars::HTTP_PORT, &defaults::HTTP_PORT.to_string())
                .parse()
                .context("Invalid HTTP_PORT value")?,
            database_url: env_var_or(env_vars::DATABASE_URL, defaults::DATABASE_URL),
            assistant: AssistantConfig {
                base_url: env_var_or(env_vars::ASSISTANT_BASE_URL, defaults::ASSISTANT_BASE_URL),
                api_key: env::var(env_vars::ASSISTANT_API_KEY)
                    .ok()
                    .filter(|k| !k.is_empty()),
                assistant_id: env::var(env_vars::ASSISTANT_ID).unwrap_or_default(),
                title_model: env_var_or(env_vars::TITLE_MODEL, defaults::TITLE_MODEL),
            },
            usage: UsageConfig {
                default_daily_limit: env_var_or(
                    env_vars::DAILY_USAGE_LIMIT,
                    &usage::DEFAULT_DAILY_LIMIT.to_string(),
                )
                .parse()
                .context("Invalid DAILY_USAGE_LIMIT value")?,
                reset_hour_utc: env_var_or(
                    env_vars::USAGE_RESET_HOUR_UTC,
                    &usage::DEFAULT_RESET_HOUR_UTC.to_string(),
                )
                .parse()
                .context("Invalid USAGE_RESET_HOUR_UTC value")?,
                purge_interval_secs: env_var_or(
                    env_vars::USAGE_PURGE_INTERVAL_SECS,
                    &usage::DEFAULT_PURGE_INTERVAL_SECS.to_string(),
                )
                .parse()
                .context("Invalid USAGE_PURGE_INTERVAL_SECS value")?,
            },
            pipeline: PipelineConfig {
                enrichment_timeout_ms: env_var_or(
                    env_vars::ENRICHMENT_TIMEOUT_MS,
                    &pipeline::DEFAULT_ENRICHMENT_TIMEOUT_MS.to_string(),
                )
                .parse()
                .context("Invalid ENRICHMENT_TIMEOUT_MS value")?,
                auto_name_threads: env_var_or(env_vars::AUTO_NAME_THREADS, "true")
                    .parse()
                    .context("Invalid AUTO_NAME_THREADS value")?,
            },
            recommendations: RecommendationConfig {
                poll_interval_ms: env_var_or(
                    env_vars::RECOMMENDATION_POLL_INTERVAL_MS,
                    &recommendations::DEFAULT_POLL_INTERVAL_MS.to_string(),
                )
                .parse()
                .context("Invalid RECOMMENDATION_POLL_INTERVAL_MS value")?,
                max_poll_attempts: env_var_or(
                    env_vars::RECOMMENDATION_MAX_POLL_ATTEMPTS,
                    &recommendations::DEFAULT_MAX_POLL_ATTEMPTS.to_string(),
                )
                .parse()
                .context("Invalid RECOMMENDATION_MAX_POLL_ATTEMPTS value")?,
                default_max_items: env_var_or(
                    env_vars::RECOMMENDATION_MAX_ITEMS,
                    &recommendations::DEFAULT_MAX_ITEMS.to_string(),
                )
                .parse()
                .context("Invalid RECOMMENDATION_MAX_ITEMS value")?,
            },
            auth: AuthConfig {
                user_id_header: env_var_or(env_vars::USER_ID_HEADER, defaults::USER_ID_HEADER)
                    .to_ascii_lowercase(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range
    pub fn validate(&self) -> Result<()> {
        if self.usage.reset_hour_utc > 23 {
            return Err(anyhow::anyhow!(
                "USAGE_RESET_HOUR_UTC must be between 0 and 23"
            ));
        }

        if self.recommendations.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!(
                "RECOMMENDATION_POLL_INTERVAL_MS must be greater than zero"
            ));
        }

        if self.recommendations.default_max_items == 0 {
            return Err(anyhow::anyhow!(
                "RECOMMENDATION_MAX_ITEMS must be greater than zero"
            ));
        }

        if self.assistant.assistant_id.is_empty() {
            warn!("OPENAI_ASSISTANT_ID is not set; runs will be rejected by the assistant service");
        }

        if self.assistant.api_key.is_none() {
            warn!("OPENAI_API_KEY is not set; assistant requests will be unauthenticated");
        }

        Ok(())
    }

    /// One-line-per-setting summary for startup logs
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Skincare Assistant Configuration:\n\
             - HTTP Port: {}\n\
             - Database: {}\n\
             - Assistant API: {}\n\
             - Daily Limit: {} (resets {:02}:00 UTC)\n\
             - Enrichment Timeout: {}ms\n\
             - Auto-name Threads: {}\n\
             - Recommendation Poll: {}ms x {}",
            self.http_port,
            self.database_url,
            self.assistant.base_url,
            self.usage.default_daily_limit,
            self.usage.reset_hour_utc,
            self.pipeline.enrichment_timeout_ms,
            self.pipeline.auto_name_threads,
            self.recommendations.poll_interval_ms,
            self.recommendations.max_poll_attempts,
        )
    }
}

/// Get environment variable or default value
fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}
