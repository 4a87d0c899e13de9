// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! EdgeBase Control Plane server.
//!
//! Startup order matters: database (with migrations) and object store are
//! fatal when unreachable; the event bus is optional and only wired in
//! when `NATS_URL` is set.

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};

use edgebase_control_plane::bus::{EventBus, NatsEventBus, NoopEventBus};
use edgebase_control_plane::config::Config;
use edgebase_control_plane::http::{self, AppState};
use edgebase_control_plane::migrations;
use edgebase_control_plane::persistence::PostgresPersistence;
use edgebase_control_plane::status_sweeper::{StatusSweeper, StatusSweeperConfig};
use edgebase_control_plane::storage::S3BlobStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "edgebase_control_plane=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        listen_addr = %config.listen_addr,
        s3_endpoint = %config.s3_endpoint,
        bus_enabled = config.nats_url.is_some(),
        "Starting EdgeBase control plane"
    );

    // Connect to database
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;

    info!("Connected to database");

    migrations::run(&pool).await?;

    info!("Database schema verified");

    // Connect to object store
    let blobs = Arc::new(S3BlobStore::connect(&config).await?);

    // Event bus is optional; the sync path never depends on it
    let bus: Arc<dyn EventBus> = match &config.nats_url {
        Some(url) => Arc::new(NatsEventBus::connect(url).await?),
        None => Arc::new(NoopEventBus),
    };

    let persistence = Arc::new(PostgresPersistence::new(pool));
    let state = AppState::from_backend(
        persistence.clone(),
        blobs,
        bus,
        config.signed_url_ttl,
        config.sync_stale_after,
    );

    // Background sweep: stale nodes move to offline
    let sweeper = Arc::new(StatusSweeper::new(
        persistence,
        StatusSweeperConfig {
            sweep_interval: config.sweep_interval,
            stale_after: config.heartbeat_stale_after,
        },
    ));
    let sweeper_shutdown = sweeper.shutdown_handle();
    let sweeper_task = tokio::spawn({
        let sweeper = sweeper.clone();
        async move { sweeper.run().await }
    });

    // Serve HTTP
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Control plane ready");

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    // Graceful shutdown
    sweeper_shutdown.notify_one();
    let _ = sweeper_task.await;

    info!("EdgeBase control plane shut down");

    Ok(())
}
