// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fitness-Journal API Server
//!
//! Serves signed progress-photo URLs and timezone-aware nutrition
//! aggregates for the journal frontend.

use fitness_journal::{
    config::Config,
    services::{InMemoryTimezoneStore, PhotoUrlService, PhotoUrlSettings, StorageClient},
    time_utils::SystemClock,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Fitness-Journal API");

    // Storage signing client + URL cache
    let storage = StorageClient::new(
        &config.storage_url,
        &config.photos_bucket,
        &config.storage_service_key,
    );
    let settings = PhotoUrlSettings::from_config(&config)?;
    let photo_urls = PhotoUrlService::new(Arc::new(storage), settings);
    photo_urls.start();
    tracing::info!(
        bucket = %config.photos_bucket,
        expiry_hours = config.url_expiry_hours,
        refresh_buffer_minutes = config.refresh_buffer_minutes,
        "Photo URL cache initialized"
    );

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        photo_urls,
        timezones: Arc::new(InMemoryTimezoneStore::new()),
        clock: Arc::new(SystemClock),
    });

    // Build router
    let app = fitness_journal::routes::create_router(state.clone());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.photo_urls.stop().await;
    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize structured JSON logging.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fitness_journal=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
