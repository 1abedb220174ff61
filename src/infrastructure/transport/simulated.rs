//! In-memory transport backend.
//!
//! Behaves like a radio with a fixed set of reachable units, records every
//! call it receives and can be told to fail selected calls.

use crate::domain::color::Rgb;
use crate::domain::led::LedMode;
use crate::domain::models::{DeviceIdentity, DeviceState, DutyCycle};
use crate::infrastructure::transport::{Transport, TransportError, TransportResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// One received call, with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    HasBluetooth,
    IsConnected,
    ListDevices,
    StartDiscovery,
    Connect(String),
    Disconnect,
    GetState,
    SaveState,
    SetLed(Rgb, LedMode),
    LedOff,
    SetFan(DutyCycle),
    FanOff,
    SetPump(DutyCycle, u8),
    PumpOff,
}

type FailurePredicate = Box<dyn Fn(&TransportCall) -> bool + Send + Sync>;

struct SimState {
    bluetooth: bool,
    devices: Vec<DeviceIdentity>,
    hardware: HashMap<String, DeviceState>,
    connected: Option<String>,
    calls: Vec<TransportCall>,
}

pub struct SimulatedTransport {
    state: Mutex<SimState>,
    latency: Duration,
    fail_when: Option<FailurePredicate>,
}

impl SimulatedTransport {
    pub fn new(devices: Vec<DeviceIdentity>) -> Self {
        let hardware = devices
            .iter()
            .map(|d| (d.uuid.clone(), DeviceState::factory(d.uuid.clone())))
            .collect();
        Self {
            state: Mutex::new(SimState {
                bluetooth: true,
                devices,
                hardware,
                connected: None,
                calls: Vec::new(),
            }),
            latency: Duration::ZERO,
            fail_when: None,
        }
    }

    /// Every call sleeps this long before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the call, wait out the latency and apply the failure rule
    async fn receive(&self, call: TransportCall) -> TransportResult<()> {
        debug!("simulated transport <- {:?}", call);
        let failing = self.fail_when.as_ref().is_some_and(|fail| fail(&call));
        self.lock().calls.push(call.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if failing {
            return Err(TransportError::Remote(format!("simulated failure of {:?}", call)));
        }
        Ok(())
    }

    fn with_connected<T>(&self, f: impl FnOnce(&mut DeviceState) -> T) -> TransportResult<T> {
        let mut state = self.lock();
        let uuid = state
            .connected
            .clone()
            .ok_or_else(|| TransportError::Remote("no device connected".to_string()))?;
        let device = state
            .hardware
            .get_mut(&uuid)
            .ok_or_else(|| TransportError::Remote(format!("unknown device {}", uuid)))?;
        Ok(f(device))
    }
}

#[cfg(test)]
impl SimulatedTransport {
    /// Calls matching `predicate` fail with a remote error
    pub fn fail_when(
        mut self,
        predicate: impl Fn(&TransportCall) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.fail_when = Some(Box::new(predicate));
        self
    }

    pub fn without_bluetooth(self) -> Self {
        self.lock().bluetooth = false;
        self
    }

    /// Start with a link to `uuid` already established
    pub fn already_connected(self, uuid: &str) -> Self {
        self.lock().connected = Some(uuid.to_string());
        self
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Simulate the device dropping the link
    pub fn drop_link(&self) {
        self.lock().connected = None;
    }

    pub fn hardware(&self, uuid: &str) -> Option<DeviceState> {
        self.lock().hardware.get(uuid).cloned()
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn has_bluetooth(&self) -> TransportResult<bool> {
        self.receive(TransportCall::HasBluetooth).await?;
        Ok(self.lock().bluetooth)
    }

    async fn is_connected(&self) -> TransportResult<bool> {
        self.receive(TransportCall::IsConnected).await?;
        Ok(self.lock().connected.is_some())
    }

    async fn list_devices(&self) -> TransportResult<Vec<DeviceIdentity>> {
        self.receive(TransportCall::ListDevices).await?;
        Ok(self.lock().devices.clone())
    }

    async fn start_discovery(&self) -> TransportResult<()> {
        self.receive(TransportCall::StartDiscovery).await
    }

    async fn connect(&self, uuid: &str) -> TransportResult<()> {
        self.receive(TransportCall::Connect(uuid.to_string())).await?;
        let mut state = self.lock();
        if !state.bluetooth {
            return Err(TransportError::Remote("bluetooth unavailable".to_string()));
        }
        if !state.devices.iter().any(|d| d.uuid == uuid) {
            return Err(TransportError::Remote(format!("device {} not in range", uuid)));
        }
        state.connected = Some(uuid.to_string());
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.receive(TransportCall::Disconnect).await?;
        self.lock().connected = None;
        Ok(())
    }

    async fn get_state(&self) -> TransportResult<Option<DeviceState>> {
        self.receive(TransportCall::GetState).await?;
        let state = self.lock();
        Ok(state
            .connected
            .as_ref()
            .and_then(|uuid| state.hardware.get(uuid).cloned()))
    }

    async fn save_state(&self) -> TransportResult<()> {
        self.receive(TransportCall::SaveState).await?;
        self.with_connected(|_| ())
    }

    async fn set_led(&self, color: Rgb, mode: LedMode) -> TransportResult<()> {
        self.receive(TransportCall::SetLed(color, mode)).await?;
        self.with_connected(|device| {
            device.led_on = true;
            device.red = color.red;
            device.green = color.green;
            device.blue = color.blue;
            device.led_mode = mode;
        })
    }

    async fn led_off(&self) -> TransportResult<()> {
        self.receive(TransportCall::LedOff).await?;
        self.with_connected(|device| device.led_on = false)
    }

    async fn set_fan(&self, duty: DutyCycle) -> TransportResult<()> {
        self.receive(TransportCall::SetFan(duty)).await?;
        self.with_connected(|device| {
            device.fan_on = true;
            device.fan_duty_cycle = duty;
        })
    }

    async fn fan_off(&self) -> TransportResult<()> {
        self.receive(TransportCall::FanOff).await?;
        self.with_connected(|device| device.fan_on = false)
    }

    async fn set_pump(&self, duty: DutyCycle, voltage: u8) -> TransportResult<()> {
        self.receive(TransportCall::SetPump(duty, voltage)).await?;
        self.with_connected(|device| {
            device.pump_on = true;
            device.pump_duty_cycle = duty;
            device.pump_voltage = voltage;
        })
    }

    async fn pump_off(&self) -> TransportResult<()> {
        self.receive(TransportCall::PumpOff).await?;
        self.with_connected(|device| device.pump_on = false)
    }
}
