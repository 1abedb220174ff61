use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const LAST_CONNECTED_KEY: &str = "lastConnectedDeviceId";
pub const DEVICE_NAMES_KEY: &str = "userDeviceNames";

/// Persistent string key/value storage
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// User-assigned device names, kept in insertion order.
///
/// Serialized as a list of `[uuid, name]` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceNameMap(Vec<(String, String)>);

impl DeviceNameMap {
    pub fn get(&self, uuid: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == uuid)
            .map(|(_, name)| name.as_str())
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.get(uuid).is_some()
    }

    /// Assign a name. A blank name removes the mapping instead of storing it.
    pub fn set(&mut self, uuid: &str, name: &str) {
        if name.trim().is_empty() {
            self.remove(uuid);
            return;
        }

        match self.0.iter_mut().find(|(key, _)| key == uuid) {
            Some((_, existing)) => *existing = name.to_string(),
            None => self.0.push((uuid.to_string(), name.to_string())),
        }
    }

    pub fn remove(&mut self, uuid: &str) {
        self.0.retain(|(key, _)| key != uuid);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(uuid, name)| (uuid.as_str(), name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for DeviceNameMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut map = Self::default();
        for (uuid, name) in iter {
            map.set(&uuid, &name);
        }
        map
    }
}

/// Device names and the last connected device, on top of a key/value store
pub struct PreferenceStore {
    store: Box<dyn KeyValueStore>,
}

impl PreferenceStore {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Stored names; missing or unreadable data yields an empty map
    pub fn device_names(&self) -> DeviceNameMap {
        match self.load_device_names() {
            Ok(names) => names,
            Err(e) => {
                warn!("Ignoring stored device names: {:#}", e);
                DeviceNameMap::default()
            }
        }
    }

    fn load_device_names(&self) -> Result<DeviceNameMap> {
        match self.store.get(DEVICE_NAMES_KEY)? {
            Some(serialized) => {
                serde_json::from_str(&serialized).context("Malformed device name list")
            }
            None => Ok(DeviceNameMap::default()),
        }
    }

    pub fn set_device_names(&mut self, names: &DeviceNameMap) -> Result<()> {
        let serialized = serde_json::to_string(names)?;
        self.store.set(DEVICE_NAMES_KEY, &serialized)
    }

    /// Re-read the stored names, apply one rename and persist the result
    pub fn set_device_name(&mut self, uuid: &str, name: &str) -> Result<DeviceNameMap> {
        let mut names = self.device_names();
        names.set(uuid, name);
        self.set_device_names(&names)?;
        Ok(names)
    }

    pub fn last_connected(&self) -> Option<String> {
        match self.store.get(LAST_CONNECTED_KEY) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to read last connected device: {:#}", e);
                None
            }
        }
    }

    pub fn record_connected(&mut self, uuid: &str) -> Result<()> {
        self.store.set(LAST_CONNECTED_KEY, uuid)
    }
}
