//! Shared connection pool handle and pool creation helpers.
//!
//! The store never creates or closes a pool on its own: callers build one
//! here (or anywhere else) and hand a [`StorePool`] to the store.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{PgPool, SqlitePool};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

/// Database engine behind a [`StorePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

/// A shared, externally owned connection pool.
///
/// Cloning is cheap and yields another handle to the same pool.
#[derive(Debug, Clone)]
pub enum StorePool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl StorePool {
    pub const fn backend(&self) -> Backend {
        match self {
            Self::Postgres(_) => Backend::Postgres,
            Self::Sqlite(_) => Backend::Sqlite,
        }
    }
}

impl From<PgPool> for StorePool {
    fn from(pool: PgPool) -> Self {
        Self::Postgres(pool)
    }
}

impl From<SqlitePool> for StorePool {
    fn from(pool: SqlitePool) -> Self {
        Self::Sqlite(pool)
    }
}

/// Open a pool for the URL in `config`, picking the backend by URL scheme.
pub async fn connect(config: &DatabaseConfig) -> Result<StorePool> {
    let acquire_timeout = Duration::from_secs(config.acquire_timeout_secs);

    if config.url.starts_with("postgres://") || config.url.starts_with("postgresql://") {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        info!(max_connections = config.max_connections, "PostgreSQL pool opened");
        return Ok(StorePool::Postgres(pool));
    }

    if config.url.starts_with("sqlite:") {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| Error::Connection(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        info!(max_connections = config.max_connections, "SQLite pool opened");
        return Ok(StorePool::Sqlite(pool));
    }

    Err(Error::Config(
        "database.url must start with postgres://, postgresql:// or sqlite:".to_string(),
    ))
}

/// Open (or create) a `SQLite` pool at the given file path.
///
/// Creates the parent directory if it does not exist, enables WAL journal
/// mode and sets a 5-second busy timeout.
pub async fn open_sqlite(path: &Path) -> Result<StorePool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))
        .map_err(|e| Error::Connection(e.to_string()))?
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| Error::Connection(e.to_string()))?;

    info!(path = %path.display(), "SQLite database opened");

    Ok(StorePool::Sqlite(pool))
}

/// Open an in-memory `SQLite` pool (for testing).
///
/// Limited to a single connection: every `SQLite` memory connection is its
/// own database.
pub async fn open_sqlite_in_memory() -> Result<StorePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| Error::Connection(e.to_string()))?;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(|e| Error::Connection(e.to_string()))?;

    Ok(StorePool::Sqlite(pool))
}
