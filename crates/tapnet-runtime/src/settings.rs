//! File-backed settings store
//!
//! The whole key/value map is bincode-encoded into one file and rewritten on
//! every save through a temporary file and rename.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tapnet_core::{SettingsStore, TapnetError, TapnetResult};
use tracing::trace;

type SettingsMap = BTreeMap<String, u32>;

#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSettingsStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> TapnetResult<SettingsMap> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SettingsMap::new()),
            Err(e) => {
                return Err(TapnetError::storage_error(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        bincode::deserialize(&bytes).map_err(|e| {
            TapnetError::storage_error(format!("corrupt settings in {}: {}", self.path.display(), e))
        })
    }

    fn write_map(&self, map: &SettingsMap) -> TapnetResult<()> {
        let bytes = bincode::serialize(map)
            .map_err(|e| TapnetError::storage_error(format!("failed to encode settings: {}", e)))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| {
                TapnetError::storage_error(format!(
                    "failed to write {}: {}",
                    self.path.display(),
                    e
                ))
            })
    }
}

impl SettingsStore for FileSettingsStore {
    fn load_u32(&self, key: &str) -> TapnetResult<Option<u32>> {
        let _lock = self
            .lock
            .lock()
            .map_err(|_| TapnetError::storage_error("settings lock poisoned"))?;
        Ok(self.read_map()?.get(key).copied())
    }

    fn save_u32(&self, key: &str, value: u32) -> TapnetResult<()> {
        let _lock = self
            .lock
            .lock()
            .map_err(|_| TapnetError::storage_error("settings lock poisoned"))?;
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value);
        self.write_map(&map)?;
        trace!("Saved {} = {} to {}", key, value, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapnet_core::BootCounter;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tapnet-{}-{}.bin", name, std::process::id()))
    }

    #[test]
    fn test_boot_count_persists_across_instances() {
        let path = temp_path("boots");
        let _ = fs::remove_file(&path);

        let first = BootCounter::new(FileSettingsStore::new(&path), "app/boot_count");
        assert_eq!(first.increment_on_boot(), 1);

        let second = BootCounter::new(FileSettingsStore::new(&path), "app/boot_count");
        assert_eq!(second.increment_on_boot(), 2);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_corrupt_file_reports_storage_error() {
        let path = temp_path("corrupt");
        fs::write(&path, [0xffu8; 3]).unwrap();

        let store = FileSettingsStore::new(&path);
        assert!(matches!(
            store.load_u32("app/boot_count"),
            Err(TapnetError::Storage { .. })
        ));
        let counter = BootCounter::new(store, "app/boot_count");
        assert_eq!(counter.increment_on_boot(), 1);

        let _ = fs::remove_file(&path);
    }
}
