// ABOUTME: Main library entry point for the skincare assistant conversation orchestrator
// ABOUTME: Binds local conversations to an external LLM assistant and streams replies over HTTP
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # Skincare Assistant
//!
//! Backend for a skincare chat assistant. A user message goes through the
//! message pipeline, which forwards it to an external assistant service,
//! streams the reply back, and keeps a durable local copy of both sides.
//!
//! ## Components
//!
//! - **Thread lifecycle**: local threads bound 1:1 to external threads
//! - **Message pipeline**: enrich, submit, stream, finalize
//! - **File reconciliation**: external file ids linked to local files and messages
//! - **Usage limiter**: atomic per-user daily quota
//! - **Recommendations**: catalog ids picked by the assistant, validated locally
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use skincare_assistant::config::ServerConfig;
//! use skincare_assistant::errors::AppResult;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("Skincare assistant configured with port: HTTP={}", config.http_port);
//!     Ok(())
//! }
//! ```

/// External assistant service client and run stream types
pub mod assistant;

/// Trusted-header caller identity
pub mod auth;

/// Catalog provider collaborator
pub mod catalog;

/// Configuration management
pub mod config;

/// Application constants
pub mod constants;

/// `SQLite` persistence
pub mod database;

/// Profile enrichment collaborator
pub mod enrichment;

/// Unified error handling with reason codes
pub mod errors;

/// Structured logging setup
pub mod logging;

/// Domain models
pub mod models;

/// Dependency injection container
pub mod resources;

/// HTTP routes
pub mod routes;

/// Domain services
pub mod services;
