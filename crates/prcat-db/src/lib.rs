use std::sync::Arc;
use std::time::Duration;

use prcat_core::{CrawlConfig, DatabaseConfig, ProductSink, SinkError, StorageKind};
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

pub mod json_store;
pub mod pg_store;
pub mod products;

pub use json_store::JsonFileSink;
pub use pg_store::PgProductSink;
pub use products::{get_product, list_product_ids, upsert_product, upsert_products, ProductRow};

// Path relative to crates/prcat-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from(&DatabaseConfig::default())
    }
}

impl From<&DatabaseConfig> for PoolConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            acquire_timeout_secs: config.acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    // The _sqlx_migrations table does not exist on a fresh database; count that as zero.
    let applied_before = applied_migrations(pool).await;
    MIGRATOR.run(pool).await?;
    let applied_after = applied_migrations(pool).await;

    let delta = (applied_after - applied_before).max(0);
    Ok(usize::try_from(delta).unwrap_or(0))
}

async fn applied_migrations(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}

/// Open the sink selected by `storage.type`.
///
/// The database sink connects, applies pending migrations, and then serves
/// reads and writes from the pool.
///
/// # Errors
///
/// Returns [`DbError::Sink`] if the output directory cannot be created, or
/// [`DbError::Sqlx`] / [`DbError::Migration`] if the database is unusable.
pub async fn open_sink(config: &CrawlConfig) -> Result<Arc<dyn ProductSink>, DbError> {
    let storage = &config.storage;
    match storage.kind {
        StorageKind::Json => {
            let sink = JsonFileSink::new(&storage.output_dir)?;
            tracing::info!(dir = %storage.output_dir.display(), "using JSON file storage");
            Ok(Arc::new(sink))
        }
        StorageKind::Database => {
            let pool = connect_pool(
                &storage.database.connection_url(),
                PoolConfig::from(&storage.database),
            )
            .await?;
            let applied = run_migrations(&pool).await?;
            tracing::info!(applied, "using database storage");
            Ok(Arc::new(PgProductSink::new(pool)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_follows_database_config() {
        let db = DatabaseConfig {
            max_connections: 42,
            min_connections: 7,
            acquire_timeout_secs: 9,
            ..DatabaseConfig::default()
        };

        let pool_config = PoolConfig::from(&db);
        assert_eq!(pool_config.max_connections, 42);
        assert_eq!(pool_config.min_connections, 7);
        assert_eq!(pool_config.acquire_timeout_secs, 9);
    }

    #[tokio::test]
    async fn json_storage_opens_without_a_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CrawlConfig::default();
        config.storage.kind = StorageKind::Json;
        config.storage.output_dir = dir.path().join("out");

        let sink = open_sink(&config).await.unwrap();
        assert!(sink.existing_ids().await.unwrap().is_empty());
        assert!(dir.path().join("out").is_dir());
    }
}
