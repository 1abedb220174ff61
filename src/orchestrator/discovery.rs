use crate::domain::error::{OrchestratorError, OrchestratorResult};
use crate::domain::models::DeviceIdentity;
use crate::domain::preferences::DeviceNameMap;
use crate::orchestrator::{rejected, Orchestrator, Transition};
use tracing::{debug, info, warn};

/// Device to pre-select: the first listed device with a user-assigned name,
/// else the last connected device if it is still listed.
pub fn select_default_device(
    devices: &[DeviceIdentity],
    names: &DeviceNameMap,
    last_connected: Option<&str>,
) -> Option<String> {
    devices
        .iter()
        .find(|device| names.contains(&device.uuid))
        .or_else(|| {
            let last = last_connected?;
            devices.iter().find(|device| device.uuid == last)
        })
        .map(|device| device.uuid.clone())
}

impl Orchestrator {
    /// Replace the device list with what the transport currently sees
    pub async fn refresh_device_list(&self) -> OrchestratorResult<()> {
        let status = self.status();
        if !status.is_idle() {
            return Err(rejected(status, "refresh devices"));
        }
        if !self.refresh_capability().await {
            return Err(OrchestratorError::TransportUnavailable);
        }
        self.discover().await
    }

    /// Query Bluetooth capability and publish it; keeps the last known value
    /// when the query fails
    pub(crate) async fn refresh_capability(&self) -> bool {
        match self.transport.has_bluetooth().await {
            Ok(available) => {
                self.update(|s| s.bluetooth_available = available);
                available
            }
            Err(e) => {
                warn!("Bluetooth capability query failed: {}", e);
                self.snapshot.borrow().bluetooth_available
            }
        }
    }

    pub(crate) async fn discover(&self) -> OrchestratorResult<()> {
        let Ok(_gate) = self.discovery_gate.try_lock() else {
            return Err(rejected(self.status(), "refresh devices"));
        };
        self.transition(Transition::BeginDiscovery)?;

        let result = self.transport.list_devices().await;
        if let Ok(devices) = &result {
            let last_connected = self.preferences().last_connected();
            self.update(|s| {
                if s.selected_device.is_none() {
                    s.selected_device =
                        select_default_device(devices, &s.device_names, last_connected.as_deref());
                    if let Some(uuid) = &s.selected_device {
                        info!(device = %uuid, "Selected default device");
                    }
                }
                s.devices = devices.clone();
            });
            debug!("Found {} devices", devices.len());
        }

        self.transition(Transition::EndDiscovery)?;

        result.map(|_| ()).map_err(|e| {
            warn!("Listing devices failed: {}", e);
            OrchestratorError::command_failed("list devices", e)
        })
    }

    /// Default selection against the current list, names and history
    pub(crate) fn default_device(&self) -> Option<String> {
        let last_connected = self.preferences().last_connected();
        let snapshot = self.snapshot.borrow();
        select_default_device(
            &snapshot.devices,
            &snapshot.device_names,
            last_connected.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ConnectionStatus;
    use crate::domain::preferences::{KeyValueStore, DEVICE_NAMES_KEY, LAST_CONNECTED_KEY};
    use crate::infrastructure::storage::MemoryStore;
    use crate::infrastructure::transport::simulated::TransportCall;
    use crate::infrastructure::transport::SimulatedTransport;
    use crate::orchestrator::test_support::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::time::Duration;

    fn names(pairs: &[(&str, &str)]) -> DeviceNameMap {
        pairs
            .iter()
            .map(|(uuid, name)| (uuid.to_string(), name.to_string()))
            .collect()
    }

    #[rstest]
    #[case::last_connected(&["A"], &[], Some("A"), Some("A"))]
    #[case::named_beats_last(&["A", "B", "C"], &[("C", "Loop"), ("B", "Desk")], Some("A"), Some("B"))]
    #[case::named_not_listed(&["A"], &[("Z", "Gone")], Some("A"), Some("A"))]
    #[case::last_not_listed(&["A", "B"], &[], Some("Z"), None)]
    #[case::nothing_known(&["A"], &[], None, None)]
    #[case::empty_list(&[], &[("A", "Desk")], Some("A"), None)]
    fn test_default_selection(
        #[case] listed: &[&str],
        #[case] named: &[(&str, &str)],
        #[case] last: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        let list = devices(listed);
        let map = names(named);

        let first = select_default_device(&list, &map, last);
        let second = select_default_device(&list, &map, last);

        assert_eq!(first.as_deref(), expected);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_refresh_selects_last_connected() {
        let mut store = MemoryStore::default();
        store.set(LAST_CONNECTED_KEY, "A").unwrap();
        let h = harness_with_store(SimulatedTransport::new(devices(&["A"])), store);

        h.orchestrator.refresh_device_list().await.unwrap();

        let snapshot = h.orchestrator.snapshot();
        assert_eq!(snapshot.devices, devices(&["A"]));
        assert_eq!(snapshot.selected_device.as_deref(), Some("A"));
        assert_eq!(snapshot.status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_refresh_keeps_explicit_selection() {
        let mut store = MemoryStore::default();
        store.set(DEVICE_NAMES_KEY, r#"[["A","Desk"]]"#).unwrap();
        let h = harness_with_store(SimulatedTransport::new(devices(&["A", "B"])), store);
        h.orchestrator.select_device("B").unwrap();

        h.orchestrator.refresh_device_list().await.unwrap();

        assert_eq!(h.orchestrator.snapshot().selected_device.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_refresh_without_bluetooth_is_unavailable() {
        let h = harness(SimulatedTransport::new(devices(&["A"])).without_bluetooth());

        let err = h.orchestrator.refresh_device_list().await.unwrap_err();

        assert!(matches!(err, OrchestratorError::TransportUnavailable));
        assert_eq!(h.transport.count(|c| matches!(c, TransportCall::ListDevices)), 0);
        let snapshot = h.orchestrator.snapshot();
        assert!(!snapshot.bluetooth_available);
        assert_eq!(snapshot.status_line(), "Bluetooth not available");
    }

    #[tokio::test]
    async fn test_refresh_rejected_while_connected() {
        let h = connected(&["A"], "A").await;

        let err = h.orchestrator.refresh_device_list().await.unwrap_err();

        assert!(err.is_silent());
        assert!(h.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_listing_keeps_previous_list() {
        let h = harness(
            SimulatedTransport::new(devices(&["A"]))
                .fail_when(|c| matches!(c, TransportCall::ListDevices)),
        );

        assert!(h.orchestrator.refresh_device_list().await.is_err());

        let snapshot = h.orchestrator.snapshot();
        assert!(snapshot.devices.is_empty());
        assert_eq!(snapshot.status, ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_waits_for_running_refresh() {
        let h = harness(
            SimulatedTransport::new(devices(&["A"])).with_latency(Duration::from_millis(20)),
        );

        let refresh = h.orchestrator.refresh_device_list();
        let connect = async {
            // let the refresh claim the discovery gate first
            tokio::time::sleep(Duration::from_millis(30)).await;
            assert_eq!(h.orchestrator.status(), ConnectionStatus::Discovering);
            h.orchestrator.connect("A").await
        };
        let (refreshed, connected) = tokio::join!(refresh, connect);

        refreshed.unwrap();
        connected.unwrap();
        let calls = h.transport.calls();
        let listed = calls.iter().position(|c| *c == TransportCall::ListDevices);
        let connect = calls.iter().position(|c| matches!(c, TransportCall::Connect(_)));
        assert!(listed < connect);
        assert_eq!(h.orchestrator.status(), ConnectionStatus::Connected);
    }
}
