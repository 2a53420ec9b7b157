// ABOUTME: System-wide constants and configuration defaults for the skincare assistant backend
// ABOUTME: Groups service names, default limits, timeouts, and environment variable names
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Constants Module
//!
//! Hardcoded defaults used when the matching environment variable is absent.

/// Service identity used in logs
pub mod service_names {
    /// Server binary and log target name
    pub const SKINCARE_ASSISTANT_SERVER: &str = "skincare-assistant-server";
}

/// Default values for configuration
pub mod defaults {
    /// Default HTTP port
    pub const HTTP_PORT: u16 = 8081;

    /// Default database location
    pub const DATABASE_URL: &str = "sqlite:./skincare_assistant.db";

    /// Default assistant API base URL
    pub const ASSISTANT_BASE_URL: &str = "https://api.openai.com/v1";

    /// Model used for short completions such as thread titles
    pub const TITLE_MODEL: &str = "gpt-4o-mini";

    /// Header carrying the caller id set by the upstream authentication gateway
    pub const USER_ID_HEADER: &str = "x-user-id";
}

/// Usage quota defaults
pub mod usage {
    /// Default number of model invocations per user per usage day
    pub const DEFAULT_DAILY_LIMIT: u32 = 50;

    /// UTC hour at which a new usage day starts
    pub const DEFAULT_RESET_HOUR_UTC: u32 = 4;

    /// How often expired counters are purged
    pub const DEFAULT_PURGE_INTERVAL_SECS: u64 = 3600;
}

/// Message pipeline defaults
pub mod pipeline {
    /// Upper bound for profile enrichment before falling back to raw content
    pub const DEFAULT_ENRICHMENT_TIMEOUT_MS: u64 = 1500;

    /// Capacity of the caller-facing fragment channel
    pub const STREAM_CHANNEL_CAPACITY: usize = 64;

    /// Maximum characters kept from a generated thread title
    pub const MAX_TITLE_CHARS: usize = 60;

    /// Prefix for external message ids synthesized when the stream never reports one
    pub const LOCAL_MESSAGE_ID_PREFIX: &str = "local_";

    /// Fragments between writes of the partial assistant reply
    pub const REPLY_FLUSH_FRAGMENTS: usize = 8;
}

/// Recommendation extraction defaults
pub mod recommendations {
    /// Interval between run status polls
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

    /// Polls before giving up on a run
    pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 120;

    /// Default maximum number of recommended products
    pub const DEFAULT_MAX_ITEMS: usize = 3;
}

/// HTTP client limits for the assistant service
pub mod http_client {
    /// Connection timeout
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;

    /// Whole-request timeout for non-streaming calls
    pub const REQUEST_TIMEOUT_SECS: u64 = 120;

    /// Longest silence tolerated between chunks of a streamed run
    pub const STREAM_IDLE_TIMEOUT_SECS: u64 = 90;
}

/// Environment variable names
pub mod env_vars {
    /// HTTP listen port
    pub const HTTP_PORT: &str = "HTTP_PORT";
    /// Database connection string
    pub const DATABASE_URL: &str = "DATABASE_URL";
    /// Assistant API key
    pub const ASSISTANT_API_KEY: &str = "OPENAI_API_KEY";
    /// Assistant API base URL
    pub const ASSISTANT_BASE_URL: &str = "OPENAI_BASE_URL";
    /// Configured assistant id
    pub const ASSISTANT_ID: &str = "OPENAI_ASSISTANT_ID";
    /// Model used for titles
    pub const TITLE_MODEL: &str = "TITLE_MODEL";
    /// Default daily limit
    pub const DAILY_USAGE_LIMIT: &str = "DAILY_USAGE_LIMIT";
    /// Usage day cutoff hour
    pub const USAGE_RESET_HOUR_UTC: &str = "USAGE_RESET_HOUR_UTC";
    /// Counter purge interval
    pub const USAGE_PURGE_INTERVAL_SECS: &str = "USAGE_PURGE_INTERVAL_SECS";
    /// Enrichment timeout
    pub const ENRICHMENT_TIMEOUT_MS: &str = "ENRICHMENT_TIMEOUT_MS";
    /// Whether to auto-name threads
    pub const AUTO_NAME_THREADS: &str = "AUTO_NAME_THREADS";
    /// Run poll interval
    pub const RECOMMENDATION_POLL_INTERVAL_MS: &str = "RECOMMENDATION_POLL_INTERVAL_MS";
    /// Run poll attempts
    pub const RECOMMENDATION_MAX_POLL_ATTEMPTS: &str = "RECOMMENDATION_MAX_POLL_ATTEMPTS";
    /// Default recommendation size
    pub const RECOMMENDATION_MAX_ITEMS: &str = "RECOMMENDATION_MAX_ITEMS";
    /// Trusted caller id header
    pub const USER_ID_HEADER: &str = "AUTH_USER_ID_HEADER";
}
