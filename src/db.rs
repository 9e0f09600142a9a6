//! Connection pool setup, schema migration and the transaction retry helpers.

pub mod transaction;

use std::time::{Duration, Instant};

use metrics::{counter, gauge};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::migrator::Migrator;

pub use transaction::{finish, with_retry, RetryPolicy};

pub type DbPool = DatabaseConnection;

/// Pool sizing and timeouts, derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for PoolSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

impl PoolSettings {
    fn connect_options(&self) -> ConnectOptions {
        let mut opt = ConnectOptions::new(self.url.clone());
        opt.max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect_timeout(self.connect_timeout)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .sqlx_logging(false);
        opt
    }
}

/// Opens a pool with explicit settings.
///
/// # Errors
/// `ServiceError::DatabaseError` when the database is unreachable.
pub async fn connect(settings: &PoolSettings) -> Result<DbPool, ServiceError> {
    debug!(?settings, "opening database pool");
    gauge!("docflow_db.max_connections", settings.max_connections as f64);

    let pool = Database::connect(settings.connect_options())
        .await
        .map_err(|e| {
            error!(error = %e, "could not open database pool");
            counter!("docflow_db.connection_failures", 1);
            ServiceError::db_error(e)
        })?;

    info!(max_connections = settings.max_connections, "database pool ready");
    Ok(pool)
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    connect(&PoolSettings::from(cfg)).await
}

/// Applies pending migrations. Already applied ones are skipped.
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    let started = Instant::now();
    let outcome = Migrator::up(pool, None).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(()) => {
            info!(elapsed_ms, "schema up to date");
            Ok(())
        }
        Err(e) => {
            error!(elapsed_ms, error = %e, "schema migration failed");
            Err(ServiceError::db_error(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_settings_follow_app_config() {
        let mut app = AppConfig::new("sqlite::memory:".into(), "test".into());
        app.db_max_connections = 1;
        app.db_min_connections = 1;
        app.db_acquire_timeout_secs = 3;

        let settings = PoolSettings::from(&app);
        assert_eq!(settings.url, "sqlite::memory:");
        assert_eq!(settings.max_connections, 1);
        assert_eq!(settings.acquire_timeout, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn migrations_apply_to_empty_database() {
        let settings = PoolSettings {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = connect(&settings).await.unwrap();
        run_migrations(&pool).await.unwrap();
        // Second run is a no-op.
        run_migrations(&pool).await.unwrap();
    }
}
