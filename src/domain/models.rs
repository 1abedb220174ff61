use crate::domain::color::Rgb;
use crate::domain::led::{LedMode, LedView};
use crate::domain::preferences::DeviceNameMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A device reported by the transport during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub uuid: String,
    #[serde(default)]
    pub discovered_name: Option<String>,
}

impl DeviceIdentity {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            discovered_name: None,
        }
    }

    pub fn named(uuid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            discovered_name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Discovering,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionStatus {
    /// True while a connect or disconnect is in flight
    pub fn is_transitioning(self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }

    /// Disconnected, with or without a discovery refresh running
    pub fn is_idle(self) -> bool {
        matches!(self, Self::Disconnected | Self::Discovering)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Discovering => "discovering",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(label)
    }
}

/// Fan or pump speed in percent, always within 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DutyCycle(u8);

impl DutyCycle {
    pub const MAX: u8 = 100;

    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(0, Self::MAX as i64) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn offset(self, delta: i64) -> Self {
        Self::clamped(self.0 as i64 + delta)
    }
}

impl TryFrom<u8> for DutyCycle {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value > Self::MAX {
            return Err(format!("duty cycle {} out of range 0-100", value));
        }
        Ok(Self(value))
    }
}

impl From<DutyCycle> for u8 {
    fn from(duty: DutyCycle) -> Self {
        duty.0
    }
}

impl fmt::Display for DutyCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Full hardware state as read back from the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub device_uuid: String,
    pub led_on: bool,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub led_mode: LedMode,
    pub fan_on: bool,
    pub fan_duty_cycle: DutyCycle,
    pub pump_on: bool,
    pub pump_duty_cycle: DutyCycle,
    pub pump_voltage: u8,
}

impl DeviceState {
    /// Power-on defaults of a freshly reset unit
    pub fn factory(device_uuid: impl Into<String>) -> Self {
        Self {
            device_uuid: device_uuid.into(),
            led_on: true,
            red: 0,
            green: 120,
            blue: 255,
            led_mode: LedMode::Static,
            fan_on: true,
            fan_duty_cycle: DutyCycle::clamped(65),
            pump_on: true,
            pump_duty_cycle: DutyCycle::clamped(70),
            pump_voltage: 11,
        }
    }

    pub fn color(&self) -> Rgb {
        Rgb::new(self.red, self.green, self.blue)
    }
}

/// Hardware mirror entry, replaced as a whole on every successful read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareSnapshot {
    pub version: u64,
    pub state: DeviceState,
}

/// Values shown by the presentation layer.
///
/// Dispatch writes these optimistically; reconciliation overwrites them from
/// the hardware mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlValues {
    pub led_on: bool,
    pub color: Rgb,
    pub led_view: LedView,
    pub fan_on: bool,
    pub fan_duty: DutyCycle,
    pub pump_on: bool,
    pub pump_duty: DutyCycle,
    pub pump_voltage: u8,
}

impl Default for ControlValues {
    fn default() -> Self {
        Self {
            led_on: false,
            color: Rgb::default(),
            led_view: LedMode::Static.view(),
            fan_on: false,
            fan_duty: DutyCycle::default(),
            pump_on: false,
            pump_duty: DutyCycle::default(),
            pump_voltage: 0,
        }
    }
}

impl From<&DeviceState> for ControlValues {
    fn from(state: &DeviceState) -> Self {
        Self {
            led_on: state.led_on,
            color: state.color(),
            led_view: state.led_mode.view(),
            fan_on: state.fan_on,
            fan_duty: state.fan_duty_cycle,
            pump_on: state.pump_on,
            pump_duty: state.pump_duty_cycle,
            pump_voltage: state.pump_voltage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanPreset {
    pub id: String,
    pub name: String,
    pub duty: DutyCycle,
}

impl FanPreset {
    pub fn new(id: &str, name: &str, duty: u8) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            duty: DutyCycle::clamped(duty as i64),
        }
    }
}

/// Observable orchestrator state, published through a watch channel
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub status: ConnectionStatus,
    pub bluetooth_available: bool,
    pub devices: Vec<DeviceIdentity>,
    pub selected_device: Option<String>,
    pub device_names: DeviceNameMap,
    pub hardware: Option<Arc<HardwareSnapshot>>,
    pub controls: ControlValues,
    pub state_initialized: bool,
}

impl Snapshot {
    pub fn status_line(&self) -> &'static str {
        if !self.bluetooth_available {
            return "Bluetooth not available";
        }
        match self.status {
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Disconnecting => "Disconnecting...",
            ConnectionStatus::Connected => "Connected to",
            ConnectionStatus::Disconnected | ConnectionStatus::Discovering => {
                "Looking for devices..."
            }
        }
    }

    /// User-assigned name of the selected device, falling back to its uuid
    pub fn display_name(&self) -> Option<String> {
        let uuid = self.selected_device.as_deref()?;
        Some(
            self.device_names
                .get(uuid)
                .map(str::to_string)
                .unwrap_or_else(|| uuid.to_string()),
        )
    }
}
