//! # Parcelhub Settings
//!
//! Durable key-value settings for the shipping core.
//!
//! The shipping registry owns exactly one persisted value,
//! [`DEFAULT_SHIPPING_PROVIDER_KEY`]. Everything else a booking produces is the
//! caller's responsibility to persist.
//!
//! ## Stores
//!
//! | Store | Description |
//! |-------|-------------|
//! | [`MemorySettingsStore`] | Process-local map, used in tests and one-shot tools |
//! | [`DuckDbSettingsStore`] | `settings` table in a local `DuckDB` file |
//!
//! ```rust,no_run
//! use parcelhub_settings::{DuckDbSettingsStore, SettingsConfig, SettingsStore};
//!
//! let store = DuckDbSettingsStore::open(SettingsConfig::default())?;
//! store.set("default_shipping_provider", "dhl")?;
//! assert_eq!(store.get("default_shipping_provider")?.as_deref(), Some("dhl"));
//! # Ok::<(), parcelhub_settings::SettingsError>(())
//! ```

pub mod duckdb;
pub mod migrations;

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

pub use duckdb::{DuckDbConnectionManager, PooledConnection};

/// Setting key holding the configured default shipping provider.
pub const DEFAULT_SHIPPING_PROVIDER_KEY: &str = "default_shipping_provider";

/// Errors raised by settings stores.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("setting key cannot be empty")]
    EmptyKey,
}

/// Durable key-value settings used by the provider registry.
pub trait SettingsStore: Send + Sync {
    /// Reads a setting, `None` when it was never written.
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError>;

    /// Writes (or replaces) a setting.
    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError>;
}

/// In-memory settings store.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with one value.
    pub fn with_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        let store = Self::default();
        store
            .values
            .lock()
            .expect("settings map should not be poisoned")
            .insert(key.into(), value.into());
        store
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        validate_key(key)?;
        Ok(self
            .values
            .lock()
            .expect("settings map should not be poisoned")
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        validate_key(key)?;
        self.values
            .lock()
            .expect("settings map should not be poisoned")
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// Configuration for the `DuckDB` settings database.
#[derive(Debug, Clone)]
pub struct SettingsConfig {
    pub db_path: PathBuf,
    pub max_pool_size: usize,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        let db_path = env::var_os("PARCELHUB_SETTINGS_DB")
            .map(PathBuf::from)
            .filter(|path| !path.as_os_str().is_empty())
            .unwrap_or_else(|| resolve_parcelhub_home().join("settings.duckdb"));
        Self {
            db_path,
            max_pool_size: 2,
        }
    }
}

/// Settings persisted in a `DuckDB` file.
#[derive(Clone)]
pub struct DuckDbSettingsStore {
    manager: DuckDbConnectionManager,
}

impl DuckDbSettingsStore {
    /// Opens (creating if needed) the settings database and applies migrations.
    pub fn open(config: SettingsConfig) -> Result<Self, SettingsError> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let manager = DuckDbConnectionManager::new(config.db_path, config.max_pool_size);
        let connection = manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        drop(connection);

        debug!(path = %manager.db_path().display(), "settings store opened");
        Ok(Self { manager })
    }
}

impl SettingsStore for DuckDbSettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        validate_key(key)?;
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare("SELECT value FROM settings WHERE key = ?")?;
        let mut rows = statement.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        validate_key(key)?;
        let connection = self.manager.acquire()?;
        connection.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) \
             VALUES (?, ?, CURRENT_TIMESTAMP)",
            [key, value],
        )?;
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<(), SettingsError> {
    if key.trim().is_empty() {
        return Err(SettingsError::EmptyKey);
    }
    Ok(())
}

fn resolve_parcelhub_home() -> PathBuf {
    if let Some(path) = env::var_os("PARCELHUB_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".parcelhub");
    }

    PathBuf::from(".parcelhub")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn memory_store_round_trips_default_provider() {
        let store = MemorySettingsStore::new();
        assert_eq!(store.get(DEFAULT_SHIPPING_PROVIDER_KEY).expect("get"), None);

        store
            .set(DEFAULT_SHIPPING_PROVIDER_KEY, "sendcloud")
            .expect("set");
        assert_eq!(
            store.get(DEFAULT_SHIPPING_PROVIDER_KEY).expect("get").as_deref(),
            Some("sendcloud")
        );
    }

    #[test]
    fn empty_key_is_rejected() {
        let store = MemorySettingsStore::new();
        assert!(matches!(store.set("  ", "x"), Err(SettingsError::EmptyKey)));
    }

    #[test]
    fn duckdb_store_persists_across_reopen() {
        let dir = tempdir().expect("tempdir");
        let config = SettingsConfig {
            db_path: dir.path().join("nested").join("settings.duckdb"),
            max_pool_size: 1,
        };

        {
            let store = DuckDbSettingsStore::open(config.clone()).expect("open");
            store.set(DEFAULT_SHIPPING_PROVIDER_KEY, "dhl").expect("set");
            store.set(DEFAULT_SHIPPING_PROVIDER_KEY, "ups").expect("overwrite");
        }

        let reopened = DuckDbSettingsStore::open(config).expect("reopen");
        assert_eq!(
            reopened
                .get(DEFAULT_SHIPPING_PROVIDER_KEY)
                .expect("get")
                .as_deref(),
            Some("ups")
        );
        assert_eq!(reopened.get("missing").expect("get"), None);
    }
}
