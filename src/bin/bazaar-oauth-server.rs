// ABOUTME: Server binary: loads config, opens the database, and serves the HTTP API
// ABOUTME: Environment drives configuration; flags override the bind host and port
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Bazaar Marketplace

//! Bazaar OAuth server entry point

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use bazaar_oauth_server::config::ServerConfig;
use bazaar_oauth_server::database::Database;
use bazaar_oauth_server::logging;
use bazaar_oauth_server::resources::ServerResources;
use bazaar_oauth_server::routes;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "bazaar-oauth-server",
    about = "OAuth 2.0 authorization server for the Bazaar marketplace",
    version
)]
struct Args {
    /// Override the HTTP bind port
    #[arg(long)]
    port: Option<u16>,

    /// Override the HTTP bind host
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_from_env().context("Failed to initialize logging")?;

    let mut config = ServerConfig::from_env().context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.http_port = port;
    }
    if let Some(host) = args.host {
        config.host = host;
    }

    info!("Starting bazaar-oauth-server: {}", config.summary());

    let database = Database::new(&config.database.url)
        .await
        .context("Failed to open database")?;

    let bind_addr = format!("{}:{}", config.host, config.http_port);
    let resources = Arc::new(ServerResources::new(database, config));
    let app = routes::router(resources);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;

    info!("Listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install shutdown handler");
        return;
    }
    info!("Shutdown signal received");
}
