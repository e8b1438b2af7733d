use std::sync::Arc;
use std::time::Duration;

use lineup_core::config::{AppConfig, ConfigError, LoadOptions};
use lineup_core::{FrontDesk, IntakeSessions};
use lineup_db::{connect_with_config, migrations, DbPool, SqlLineupRepository};
use thiserror::Error;
use tracing::info;

use crate::notifier::OutboundNotifier;

pub type Desk = FrontDesk<SqlLineupRepository, OutboundNotifier>;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub desk: Arc<Desk>,
    pub intake: Arc<IntakeSessions>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("messenger client could not be built: {0}")]
    Messenger(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let notifier =
        OutboundNotifier::from_config(&config.messenger).map_err(BootstrapError::Messenger)?;
    info!(
        event_name = "system.bootstrap.notifier_ready",
        correlation_id = "bootstrap",
        notifier_mode = notifier.mode(),
        "outbound notifier initialized"
    );

    let desk = FrontDesk::with_horizon(
        Arc::new(SqlLineupRepository::new(db_pool.clone())),
        Arc::new(notifier),
        config.booking.horizon_days,
    );
    let intake = IntakeSessions::new(Duration::from_secs(config.booking.intake_timeout_secs));

    Ok(Application { config, db_pool, desk: Arc::new(desk), intake: Arc::new(intake) })
}
