// ABOUTME: Server binary for the skincare assistant conversation orchestrator
// ABOUTME: Loads configuration, opens the store, wires services, and serves HTTP until shutdown
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Skincare Assistant Server Binary
//!
//! Starts the HTTP API in front of the assistant service, plus the
//! background task purging expired usage counters.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use skincare_assistant::{
    assistant::{AssistantClient, OpenAiAssistantClient},
    config::ServerConfig,
    constants::service_names,
    database::Database,
    logging,
    resources::ServerResources,
    routes,
};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "skincare-assistant-server")]
#[command(about = "Skincare assistant - conversation thread orchestrator over an LLM assistant API")]
pub struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,

    /// Override database URL
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_from_env()?;

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }
    if let Some(database_url) = args.database_url {
        config.database_url = database_url;
    }

    info!(
        "Starting {} v{}",
        service_names::SKINCARE_ASSISTANT_SERVER,
        env!("CARGO_PKG_VERSION")
    );
    info!("{}", config.summary());

    let database = Database::new(&config.database_url)
        .await
        .context("Failed to initialize database")?;

    let assistant: Arc<dyn AssistantClient> = Arc::new(
        OpenAiAssistantClient::new(config.assistant.clone())
            .context("Failed to create assistant client")?,
    );
    info!("Assistant client ready: {}", assistant.name());

    let config = Arc::new(config);
    let resources = Arc::new(ServerResources::new(
        database,
        Arc::clone(&config),
        assistant,
    ));

    let purge_task = Arc::clone(&resources.usage)
        .spawn_purge_task(Duration::from_secs(config.usage.purge_interval_secs.max(1)));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("HTTP server listening on {addr}");

    let result = axum::serve(listener, routes::router(resources))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    purge_task.abort();

    if let Err(e) = result {
        error!("Server error: {e}");
        return Err(e.into());
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    info!("Shutdown signal received");
}
