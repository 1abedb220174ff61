use crate::domain::error::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{ConnectionStatus, ControlValues, HardwareSnapshot};
use crate::orchestrator::Orchestrator;
use std::sync::Arc;
use tracing::{debug, trace, warn};

impl Orchestrator {
    /// Read the full device state and replace the hardware mirror with it.
    /// Reads are serialized; a read that straddles a disconnect is dropped.
    pub async fn reconcile(&self) -> OrchestratorResult<()> {
        self.read_device_state(ConnectionStatus::Connected).await
    }

    /// State read that only lands while the status is still `expected`.
    /// Connect uses it before the link is declared up.
    pub(crate) async fn read_device_state(
        &self,
        expected: ConnectionStatus,
    ) -> OrchestratorResult<()> {
        let _sync = self.sync_gate.lock().await;
        if self.status() != expected {
            return Err(OrchestratorError::NotConnected);
        }

        let state = match self.transport.get_state().await {
            Ok(Some(state)) => state,
            Ok(None) => {
                debug!("Device reported no state");
                return Ok(());
            }
            Err(e) => {
                warn!("Reading device state failed: {}", e);
                return Err(OrchestratorError::command_failed("read device state", e));
            }
        };

        if self.status() != expected {
            debug!("Link changed during state read, discarding it");
            return Err(OrchestratorError::NotConnected);
        }

        self.update(|s| {
            let version = s.hardware.as_ref().map_or(1, |h| h.version + 1);
            trace!(version, device = %state.device_uuid, "Hardware state updated");
            s.selected_device = Some(state.device_uuid.clone());
            s.controls = ControlValues::from(&state);
            s.hardware = Some(Arc::new(HardwareSnapshot { version, state }));
            s.state_initialized = true;
        });
        Ok(())
    }

    /// One timer tick: capability, link supervision, then either a hardware
    /// read or a device list refresh
    pub async fn poll_tick(&self) {
        let available = self.refresh_capability().await;
        self.supervise_link().await;

        match self.status() {
            ConnectionStatus::Connected => {
                let _ = self.reconcile().await;
            }
            ConnectionStatus::Disconnected if available => {
                if let Err(e) = self.discover().await {
                    trace!("Periodic device refresh skipped: {}", e);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::color::Rgb;
    use crate::domain::error::OrchestratorError;
    use crate::domain::led::{LedMode, LedTab};
    use crate::domain::models::{ConnectionStatus, DutyCycle};
    use crate::infrastructure::transport::simulated::TransportCall;
    use crate::infrastructure::transport::{SimulatedTransport, Transport};
    use crate::orchestrator::tasks::spawn_poller;
    use crate::orchestrator::test_support::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reconcile_is_noop_while_disconnected() {
        let h = harness(SimulatedTransport::new(devices(&["A"])));

        assert!(h.orchestrator.reconcile().await.unwrap_err().is_silent());
        assert!(h.transport.calls().is_empty());
        assert!(h.orchestrator.snapshot().hardware.is_none());
    }

    #[tokio::test]
    async fn test_reconcile_replaces_mirror_and_decodes_led_mode() {
        let h = connected(&["A"], "A").await;
        let first = h.orchestrator.snapshot().hardware.unwrap();

        // change the hardware behind the orchestrator's back
        h.transport
            .set_led(Rgb::new(10, 20, 30), LedMode::BreatheColor)
            .await
            .unwrap();
        h.transport.set_fan(DutyCycle::clamped(90)).await.unwrap();
        h.orchestrator.reconcile().await.unwrap();

        let snapshot = h.orchestrator.snapshot();
        let hardware = snapshot.hardware.unwrap();
        assert_eq!(hardware.version, first.version + 1);
        assert_eq!(hardware.state.color(), Rgb::new(10, 20, 30));
        assert_eq!(snapshot.controls.fan_duty.value(), 90);
        assert_eq!(snapshot.controls.led_view.tab, LedTab::Animation);
        assert!(snapshot.controls.led_view.is_breathing);
        assert!(snapshot.controls.led_view.is_rainbow);
        // the previous snapshot is untouched
        assert_eq!(first.state.led_mode, LedMode::Static);
    }

    #[tokio::test]
    async fn test_failed_read_leaves_link_and_mirror_alone() {
        let reads_fail = Arc::new(AtomicBool::new(false));
        let switch = reads_fail.clone();
        let h = harness(SimulatedTransport::new(devices(&["A"])).fail_when(move |c| {
            matches!(c, TransportCall::GetState) && switch.load(Ordering::SeqCst)
        }));
        h.orchestrator.connect("A").await.unwrap();
        let before = h.orchestrator.snapshot().hardware.unwrap();

        reads_fail.store(true, Ordering::SeqCst);
        let err = h.orchestrator.reconcile().await.unwrap_err();

        assert!(matches!(err, OrchestratorError::DeviceCommandFailed { .. }));
        let snapshot = h.orchestrator.snapshot();
        assert_eq!(snapshot.status, ConnectionStatus::Connected);
        assert_eq!(snapshot.hardware.unwrap(), before);
        assert!(snapshot.state_initialized);
    }

    #[tokio::test]
    async fn test_poll_tick_refreshes_while_disconnected() {
        let h = harness(SimulatedTransport::new(devices(&["A", "B"])));

        h.orchestrator.poll_tick().await;

        assert_eq!(h.orchestrator.snapshot().devices.len(), 2);
        assert_eq!(h.transport.count(|c| matches!(c, TransportCall::GetState)), 0);
    }

    #[tokio::test]
    async fn test_poll_tick_skips_discovery_without_bluetooth() {
        let h = harness(SimulatedTransport::new(devices(&["A"])).without_bluetooth());

        h.orchestrator.poll_tick().await;

        assert_eq!(h.transport.count(|c| matches!(c, TransportCall::ListDevices)), 0);
        assert!(!h.orchestrator.snapshot().bluetooth_available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_reconciles_while_connected() {
        let h = connected(&["A"], "A").await;
        let mut poller = spawn_poller(&h.orchestrator);

        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert_eq!(h.transport.count(|c| matches!(c, TransportCall::GetState)), 1);

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(h.transport.count(|c| matches!(c, TransportCall::GetState)), 2);

        poller.stop();
        tokio::time::sleep(Duration::from_millis(9000)).await;
        assert_eq!(h.transport.count(|c| matches!(c, TransportCall::GetState)), 2);
    }
}
