//! Configuration for `tgstore`.
//!
//! A single JSON file describes how to reach the database and which
//! namespace/group the session lives in. Missing sections fall back to the
//! built-in defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Complete `tgstore` configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Connection pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `postgres://...` or `sqlite:...` URL.
    pub url: String,
    pub max_connections: u32,
    /// How long to wait for a free pooled connection (seconds).
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/pyrogram".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 30,
        }
    }
}

/// Where the session tables live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Session name; every table name is prefixed with it.
    pub namespace: String,
    /// Outer grouping (`PostgreSQL` schema, `SQLite` database name).
    /// `None` picks the backend default.
    pub group: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: "my_account".to_string(),
            group: None,
        }
    }
}

/// Load and validate configuration from a JSON file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.store.namespace.is_empty() {
        return Err(Error::Config("store.namespace must not be empty".to_string()));
    }
    if config.store.group.as_deref() == Some("") {
        return Err(Error::Config("store.group must not be empty".to_string()));
    }
    if config.database.max_connections == 0 {
        return Err(Error::Config(
            "database.max_connections must be at least 1".to_string(),
        ));
    }
    Ok(())
}
