// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Thallium Core - standalone RPC server
//!
//! Serves the messaging RPC over HTTP. The standalone server has no document
//! subsystem, so sign, scan and mail import requests fail in their handlers;
//! embed the crate through [`thallium_core::runtime::CoreRuntime`] to plug in
//! real collaborators.

use anyhow::Result;
use tracing::{error, info};

use thallium_core::collaborators::Collaborators;
use thallium_core::config::Config;
use thallium_core::persistence;
use thallium_core::runtime::CoreRuntime;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("thallium_core=info".parse()?),
        )
        .init();

    info!("Starting Thallium Core");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        http_addr = %config.http_addr,
        message_timeout_secs = config.timeouts.message.as_secs(),
        job_timeout_secs = config.timeouts.job.as_secs(),
        sweep_interval_secs = config.sweep_interval.map(|i| i.as_secs()),
        "Configuration loaded"
    );

    info!("Connecting to database...");
    let persistence = persistence::connect(&config.database_url).await?;

    if !persistence.health_check_db().await? {
        anyhow::bail!("database health check failed");
    }
    info!("Database connection established");

    let mut builder = CoreRuntime::builder()
        .persistence(persistence)
        .collaborators(Collaborators::unavailable())
        .bind_addr(config.http_addr)
        .timeouts(config.timeouts);
    if let Some(interval) = config.sweep_interval {
        builder = builder.sweep_interval(interval);
    }

    let runtime = builder.build()?.start().await?;
    info!(addr = %runtime.bind_addr(), "Thallium Core initialized successfully");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    runtime.shutdown().await?;
    info!("Shutdown complete");

    Ok(())
}
