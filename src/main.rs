// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Release Notifier server
//!
//! Polls Spotify for new releases by followed artists and announces them
//! in Telegram.

use release_notifier::{
    config::Config,
    db::{AccountStore, JsonFileStore},
    services::{
        NotificationDispatcher, PollRun, PollScheduler, PollSettings, SchedulerSettings,
        SpotifyAuth, SpotifyCatalog, SpotifyPlayer, TelegramNotifier,
    },
    time_utils::{Clock, SystemClock},
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Release Notifier");

    let store: Arc<dyn AccountStore> = Arc::new(
        JsonFileStore::open(&config.data_file)
            .await
            .expect("Failed to open account store"),
    );
    tracing::info!(path = %config.data_file, "Account store opened");

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let spotify_auth = SpotifyAuth::new(&config, http.clone(), clock.clone());
    let catalog = Arc::new(SpotifyCatalog::new(&config, http.clone()));
    let player = Arc::new(SpotifyPlayer::new(&config, http.clone()));
    let notifier: Arc<dyn NotificationDispatcher> =
        Arc::new(TelegramNotifier::new(&config, http.clone()));

    let poll_run = Arc::new(PollRun::new(
        catalog,
        Arc::new(spotify_auth.clone()),
        notifier.clone(),
        store.clone(),
        clock.clone(),
        PollSettings::from_config(&config),
    ));
    let scheduler = PollScheduler::spawn(
        poll_run,
        store.clone(),
        SchedulerSettings::from_config(&config),
    );

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        spotify_auth,
        notifier,
        player,
        scheduler: scheduler.clone(),
        clock,
        used_states: Default::default(),
    });

    // Build router
    let app = release_notifier::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("release_notifier=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
