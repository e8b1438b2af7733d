mod api;
mod bootstrap;
mod health;
mod notifier;

use std::time::{Duration, Instant};

use anyhow::Result;
use lineup_core::config::{AppConfig, LoadOptions};
use tokio::sync::watch;

const INTAKE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

fn init_logging(config: &AppConfig) {
    use lineup_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let notifier_mode =
        if app.config.messenger.enabled { "messenger" } else { "disabled" };

    let router = api::router(api::ApiState::new(app.desk.clone(), app.intake.clone()))
        .merge(health::router(app.db_pool.clone(), notifier_mode));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "lineup-server listening"
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let intake = app.intake.clone();
    let mut sweep_shutdown = shutdown_tx.subscribe();
    let sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(INTAKE_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let expired = intake.sweep(Instant::now());
                    if expired > 0 {
                        tracing::debug!(
                            event_name = "intake.sweep",
                            expired,
                            "expired intake sessions dropped"
                        );
                    }
                }
                _ = sweep_shutdown.changed() => break,
            }
        }
    });

    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await
    });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => signal?,
        served = &mut server => {
            served??;
            return Ok(());
        }
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = app.config.server.graceful_shutdown_secs,
        "lineup-server draining in-flight requests"
    );
    let _ = shutdown_tx.send(true);

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, &mut server).await {
        Ok(served) => served??,
        Err(_) => {
            tracing::warn!(
                event_name = "system.server.shutdown_timeout",
                correlation_id = "shutdown",
                "graceful shutdown window elapsed; aborting open connections"
            );
            server.abort();
        }
    }
    let _ = sweeper.await;
    app.db_pool.close().await;

    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "lineup-server stopped"
    );
    Ok(())
}
