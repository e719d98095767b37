//! Persistent settings and the boot counter
//!
//! Settings are `u32` values stored under namespaced keys such as
//! `app/boot_count`.

use crate::errors::{Result, TapnetError};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{info, warn};

// ----------------------------------------------------------------------------
// Settings Store
// ----------------------------------------------------------------------------

/// Key/value store for small integer settings
pub trait SettingsStore: Send + Sync {
    /// Load a value; `Ok(None)` when the key has never been saved
    fn load_u32(&self, key: &str) -> Result<Option<u32>>;

    /// Persist a value immediately
    fn save_u32(&self, key: &str, value: u32) -> Result<()>;
}

/// Settings kept in memory for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, u32>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: u32) -> Self {
        let store = Self::new();
        if let Ok(mut values) = store.values.lock() {
            values.insert(key.to_string(), value);
        }
        store
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load_u32(&self, key: &str) -> Result<Option<u32>> {
        let values = self
            .values
            .lock()
            .map_err(|_| TapnetError::storage_error("settings lock poisoned"))?;
        Ok(values.get(key).copied())
    }

    fn save_u32(&self, key: &str, value: u32) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| TapnetError::storage_error("settings lock poisoned"))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

impl<S: SettingsStore + ?Sized> SettingsStore for std::sync::Arc<S> {
    fn load_u32(&self, key: &str) -> Result<Option<u32>> {
        (**self).load_u32(key)
    }

    fn save_u32(&self, key: &str, value: u32) -> Result<()> {
        (**self).save_u32(key, value)
    }
}

// ----------------------------------------------------------------------------
// Boot Counter
// ----------------------------------------------------------------------------

/// Count of device boots, persisted across restarts
pub struct BootCounter<S: SettingsStore> {
    store: S,
    key: String,
}

impl<S: SettingsStore> BootCounter<S> {
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load, increment and save the counter, returning the new count
    pub fn try_increment(&self) -> Result<u32> {
        let previous = self.store.load_u32(&self.key)?.unwrap_or(0);
        let count = previous.wrapping_add(1);
        self.store.save_u32(&self.key, count)?;
        Ok(count)
    }

    /// Increment at boot; storage failure is logged and counts as a first boot
    pub fn increment_on_boot(&self) -> u32 {
        match self.try_increment() {
            Ok(count) => {
                info!("Boot count: {}", count);
                count
            }
            Err(e) => {
                warn!("Failed to update boot count under {}: {}", self.key, e);
                1
            }
        }
    }

    /// Last persisted count without incrementing
    pub fn current(&self) -> Result<u32> {
        Ok(self.store.load_u32(&self.key)?.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStore;

    impl SettingsStore for BrokenStore {
        fn load_u32(&self, _key: &str) -> Result<Option<u32>> {
            Err(TapnetError::storage_error("flash unavailable"))
        }

        fn save_u32(&self, _key: &str, _value: u32) -> Result<()> {
            Err(TapnetError::storage_error("flash unavailable"))
        }
    }

    #[test]
    fn test_first_boot_counts_one() {
        let counter = BootCounter::new(MemorySettingsStore::new(), "app/boot_count");
        assert_eq!(counter.current().unwrap(), 0);
        assert_eq!(counter.increment_on_boot(), 1);
        assert_eq!(counter.increment_on_boot(), 2);
        assert_eq!(counter.current().unwrap(), 2);
    }

    #[test]
    fn test_existing_count_is_incremented() {
        let store = MemorySettingsStore::with_value("app/boot_count", 41);
        let counter = BootCounter::new(store, "app/boot_count");
        assert_eq!(counter.increment_on_boot(), 42);
    }

    #[test]
    fn test_storage_failure_falls_back_to_one() {
        let counter = BootCounter::new(BrokenStore, "app/boot_count");
        assert!(counter.try_increment().is_err());
        assert_eq!(counter.increment_on_boot(), 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let store = std::sync::Arc::new(MemorySettingsStore::new());
        let boots = BootCounter::new(store.clone(), "app/boot_count");
        let other = BootCounter::new(store.clone(), "ota/attempts");
        boots.increment_on_boot();
        boots.increment_on_boot();
        assert_eq!(other.current().unwrap(), 0);
        assert_eq!(store.load_u32("app/boot_count").unwrap(), Some(2));
    }
}
