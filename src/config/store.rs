//! Persistence backends for [`ShutdownSettings`].
//!
//! [`JsonFileStore`] writes atomically using write-to-temp-then-rename:
//! 1. serialize to `<path>.tmp`
//! 2. fsync the temp file
//! 3. rename over `<path>`
//! 4. fsync the parent directory so the rename survives power loss
//!
//! A crash at any point leaves either the old or the new file, never a torn one.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::shutdown::ShutdownSettings;
use crate::error::StoreError;

/// Where shutdown settings are loaded from and saved to.
pub trait ConfigStore: Send + Sync + 'static {
    /// Loads stored settings; `Ok(None)` when nothing was stored yet.
    fn load(&self) -> Result<Option<ShutdownSettings>, StoreError>;

    /// Replaces the stored settings.
    fn save(&self, settings: &ShutdownSettings) -> Result<(), StoreError>;
}

/// JSON file store with atomic replacement.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Result<Option<ShutdownSettings>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let settings = serde_json::from_slice(&bytes)?;
        Ok(Some(settings))
    }

    fn save(&self, settings: &ShutdownSettings) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(settings)?;
        let tmp_path = self.tmp_path();

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }
}

/// Volatile store; settings are lost with the process.
///
/// Used when no `config_path` is configured. `fail_writes(true)` makes every
/// subsequent save fail, which exercises the non-fatal persistence path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Option<ShutdownSettings>>,
    fail: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `settings`.
    pub fn with_settings(settings: ShutdownSettings) -> Self {
        Self {
            saved: Mutex::new(Some(settings)),
            fail: AtomicBool::new(false),
        }
    }

    /// Makes subsequent writes fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Last successfully saved settings.
    pub fn saved(&self) -> Option<ShutdownSettings> {
        self.saved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Result<Option<ShutdownSettings>, StoreError> {
        Ok(self.saved())
    }

    fn save(&self, settings: &ShutdownSettings) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("writes disabled".into()));
        }
        *self
            .saved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(settings.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> ShutdownSettings {
        ShutdownSettings {
            message: "maintenance at 18:00".into(),
            allow_all_queued_items: true,
            allow_whitelisted_projects: true,
            allow_all_job_kinds: false,
            whitelisted_projects: ["zeta", "alpha"].into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("drain.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("drain.json"));
        store.save(&sample()).unwrap();

        assert_eq!(store.load().unwrap(), Some(sample()));
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn whitelist_is_written_sorted() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("drain.json"));
        store.save(&sample()).unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        let alpha = text.find("alpha").unwrap();
        let zeta = text.find("zeta").unwrap();
        assert!(alpha < zeta);
    }

    #[test]
    fn invalid_json_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drain.json");
        fs::write(&path, b"{ not json").unwrap();

        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Json(_)));
        assert_eq!(err.as_label(), "store_json");
    }

    #[test]
    fn older_file_without_new_fields_loads_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drain.json");
        fs::write(&path, br#"{ "message": "bye", "allow_all_queued_items": true }"#).unwrap();

        let loaded = JsonFileStore::new(&path).load().unwrap().unwrap();
        assert_eq!(loaded.message, "bye");
        assert!(loaded.allow_all_queued_items);
        assert!(!loaded.allow_all_job_kinds);
        assert!(loaded.whitelisted_projects.is_empty());
    }

    #[test]
    fn memory_store_can_reject_writes() {
        let store = MemoryStore::new();
        store.fail_writes(true);
        assert!(matches!(
            store.save(&sample()),
            Err(StoreError::Rejected(_))
        ));
        assert!(store.saved().is_none());

        store.fail_writes(false);
        store.save(&sample()).unwrap();
        assert_eq!(store.saved(), Some(sample()));
    }
}
