//! Key/value storage backing the preference store.

use crate::domain::preferences::KeyValueStore;
use crate::domain::settings::app_config_dir;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Flat JSON object of string values, rewritten on every change
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileStore {
    pub fn open_default() -> Result<Self> {
        Ok(Self::open(app_config_dir()?.join("preferences.json")))
    }

    /// Load `path`. A missing file is empty; an unreadable or malformed one
    /// is logged and treated as empty, and gets replaced on the next write.
    pub fn open(path: PathBuf) -> Self {
        let values = match Self::load(&path) {
            Ok(values) => values,
            Err(e) => {
                warn!("Ignoring preferences in {}: {:#}", path.display(), e);
                BTreeMap::new()
            }
        };
        Self { path, values }
    }

    fn load(path: &Path) -> Result<BTreeMap<String, String>> {
        match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).context("Malformed preferences file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).context("Failed to read preferences"),
        }
    }

    fn flush(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        self.flush()
    }
}

/// In-memory store; clones share the same map
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MemoryStore {
    values: std::sync::Arc<std::sync::Mutex<BTreeMap<String, String>>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn raw(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.raw(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("aquaris-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_missing_file_is_empty() {
        let store = JsonFileStore::open(temp_path("missing"));
        assert_eq!(store.get("anything").unwrap(), None);
    }

    #[test]
    fn test_values_survive_reopen() {
        let path = temp_path("reopen");
        let mut store = JsonFileStore::open(path.clone());
        store.set("lastConnectedDeviceId", "A").unwrap();

        let reopened = JsonFileStore::open(path.clone());
        assert_eq!(
            reopened.get("lastConnectedDeviceId").unwrap().as_deref(),
            Some("A")
        );
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_malformed_file_falls_back_to_empty() {
        let path = temp_path("malformed");
        fs::write(&path, "[1, 2").unwrap();

        let mut store = JsonFileStore::open(path.clone());
        assert_eq!(store.get("lastConnectedDeviceId").unwrap(), None);

        store.set("lastConnectedDeviceId", "A").unwrap();
        let reopened = JsonFileStore::open(path.clone());
        assert_eq!(
            reopened.get("lastConnectedDeviceId").unwrap().as_deref(),
            Some("A")
        );
        let _ = fs::remove_file(path);
    }
}
