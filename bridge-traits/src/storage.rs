//! Settings Storage Abstraction
//!
//! Key-value preferences that live outside the library database. The
//! persisted library sync version is stored here so that wiping the entity
//! store never loses track of which migrations already ran.

use async_trait::async_trait;
use core_async::sync::Mutex;
use std::collections::BTreeMap;

use crate::error::{BridgeError, Result};

/// Key-value settings storage trait
///
/// - Desktop: SQLite-backed `bridge_desktop::SqliteSettingsStore`
/// - iOS/macOS: UserDefaults
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn remember_version(store: &dyn SettingsStore) -> Result<()> {
///     store.set_i64("library.sync_version", 11).await
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_string(key, if value { "true" } else { "false" })
            .await
    }

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get_string(key).await? {
            Some(raw) => raw
                .parse::<bool>()
                .map(Some)
                .map_err(|e| BridgeError::Settings(format!("{key}: {e}"))),
            None => Ok(None),
        }
    }

    /// Store an integer value
    async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.set_string(key, &value.to_string()).await
    }

    /// Retrieve an integer value
    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        match self.get_string(key).await? {
            Some(raw) => raw
                .parse::<i64>()
                .map(Some)
                .map_err(|e| BridgeError::Settings(format!("{key}: {e}"))),
            None => Ok(None),
        }
    }

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Clear all settings
    async fn clear_all(&self) -> Result<()>;
}

/// Process-local settings store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.lock().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.values.lock().await.keys().cloned().collect())
    }

    async fn clear_all(&self) -> Result<()> {
        self.values.lock().await.clear();
        Ok(())
    }
}
