//! Orchestrator
//!
//! Single owner of the connection status, the device list and the hardware
//! mirror for one cooling unit. Everything observable is published as a
//! [`Snapshot`] through a watch channel; readers always see a complete value.
//!
//! - [`connection`] - status transition table, connect and disconnect
//! - [`discovery`] - device list refresh and default selection
//! - [`sync`] - hardware reconciliation and the poll tick
//! - [`dispatch`] - LED, fan and pump commands
//! - [`tasks`] - poller and held-button repeater

pub mod connection;
pub mod discovery;
pub mod dispatch;
pub mod sync;
pub mod tasks;

use crate::domain::error::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{ConnectionStatus, FanPreset, Snapshot};
use crate::domain::preferences::PreferenceStore;
use crate::domain::settings::Settings;
use crate::infrastructure::transport::Transport;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tasks::Repeater;
use tokio::sync::watch;
use tracing::{info, warn};

pub use connection::Transition;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub poll_interval: Duration,
    pub repeat_interval: Duration,
    pub nudge_step: i64,
    pub fan_presets: Vec<FanPreset>,
}

impl From<&Settings> for OrchestratorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            repeat_interval: settings.repeat_interval(),
            nudge_step: settings.nudge_step,
            fan_presets: settings.fan_presets.clone(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

pub struct Orchestrator {
    transport: Arc<dyn Transport>,
    config: OrchestratorConfig,
    preferences: Mutex<PreferenceStore>,
    snapshot: watch::Sender<Snapshot>,
    // Held for the duration of a device list refresh
    discovery_gate: tokio::sync::Mutex<()>,
    // Serializes hardware reads
    sync_gate: tokio::sync::Mutex<()>,
    repeater: Mutex<Repeater>,
}

impl Orchestrator {
    pub fn new(
        transport: Arc<dyn Transport>,
        preferences: PreferenceStore,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        let (snapshot, _) = watch::channel(Snapshot {
            device_names: preferences.device_names(),
            ..Snapshot::default()
        });

        Arc::new(Self {
            transport,
            config,
            preferences: Mutex::new(preferences),
            snapshot,
            discovery_gate: tokio::sync::Mutex::new(()),
            sync_gate: tokio::sync::Mutex::new(()),
            repeater: Mutex::new(Repeater::default()),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.snapshot.borrow().status
    }

    /// Bring local state in line with the transport: load names, adopt an
    /// existing link or start discovery, then poll once.
    pub async fn initialize(&self) {
        let names = self.preferences().device_names();
        self.update(|s| s.device_names = names);

        match self.transport.is_connected().await {
            Ok(true) => {
                if self.transition(Transition::LinkDetected).is_ok() {
                    info!("Transport already holds a device link");
                }
            }
            Ok(false) => {
                if let Err(e) = self.transport.start_discovery().await {
                    warn!("Starting discovery failed: {}", e);
                }
            }
            Err(e) => warn!("Link status query failed: {}", e),
        }

        let _ = self.reconcile().await;
        self.poll_tick().await;
    }

    /// Assign a display name to the connected device. A blank name removes it.
    pub fn rename_selected_device(&self, name: &str) -> OrchestratorResult<()> {
        let snapshot = self.snapshot();
        if snapshot.status != ConnectionStatus::Connected {
            return Err(rejected(snapshot.status, "rename device"));
        }
        let Some(uuid) = snapshot.selected_device else {
            return Err(rejected(snapshot.status, "rename without a selected device"));
        };

        let mut preferences = self.preferences();
        let names = match preferences.set_device_name(&uuid, name) {
            Ok(names) => names,
            Err(e) => {
                warn!(device = %uuid, "Saving device name failed: {:#}", e);
                let mut names = snapshot.device_names;
                names.set(&uuid, name);
                names
            }
        };
        drop(preferences);

        info!(device = %uuid, "Device name updated");
        self.update(|s| s.device_names = names);
        Ok(())
    }

    /// Stop the held-button repeater. The poller is stopped by its owner.
    pub fn shutdown(&self) {
        if self.is_holding() {
            info!("Cancelling held control");
            self.release_hold();
        }
        info!("Orchestrator shut down");
    }

    fn preferences(&self) -> MutexGuard<'_, PreferenceStore> {
        self.preferences
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn repeater(&self) -> MutexGuard<'_, Repeater> {
        self.repeater
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update(&self, f: impl FnOnce(&mut Snapshot)) {
        self.snapshot.send_modify(f);
    }

    /// Apply one status transition atomically
    fn transition(&self, transition: Transition) -> OrchestratorResult<ConnectionStatus> {
        let mut outcome = Err(OrchestratorError::NotConnected);
        self.snapshot.send_if_modified(|s| match s.status.apply(transition) {
            Ok(next) => {
                let changed = next != s.status;
                s.status = next;
                outcome = Ok(next);
                changed
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome
    }
}

pub(crate) fn rejected(status: ConnectionStatus, action: &'static str) -> OrchestratorError {
    OrchestratorError::OperationRejected { status, action }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::models::DeviceIdentity;
    use crate::infrastructure::storage::MemoryStore;
    use crate::infrastructure::transport::SimulatedTransport;

    pub struct Harness {
        pub orchestrator: Arc<Orchestrator>,
        pub transport: Arc<SimulatedTransport>,
        pub store: MemoryStore,
    }

    pub fn harness(transport: SimulatedTransport) -> Harness {
        harness_with_store(transport, MemoryStore::default())
    }

    pub fn harness_with_store(transport: SimulatedTransport, store: MemoryStore) -> Harness {
        build(transport, store, OrchestratorConfig::default())
    }

    pub fn harness_with_config(
        transport: SimulatedTransport,
        config: OrchestratorConfig,
    ) -> Harness {
        build(transport, MemoryStore::default(), config)
    }

    fn build(
        transport: SimulatedTransport,
        store: MemoryStore,
        config: OrchestratorConfig,
    ) -> Harness {
        let transport = Arc::new(transport);
        let preferences = PreferenceStore::new(Box::new(store.clone()));
        let orchestrator = Orchestrator::new(transport.clone(), preferences, config);
        Harness {
            orchestrator,
            transport,
            store,
        }
    }

    pub fn devices(uuids: &[&str]) -> Vec<DeviceIdentity> {
        uuids.iter().map(|uuid| DeviceIdentity::new(*uuid)).collect()
    }

    /// Connect to `uuid` and forget the calls that took
    pub async fn connected(uuids: &[&str], uuid: &str) -> Harness {
        let h = harness(SimulatedTransport::new(devices(uuids)));
        h.orchestrator.connect(uuid).await.unwrap();
        h.transport.clear_calls();
        h
    }
}
