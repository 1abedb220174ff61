//! Transport Module
//!
//! Request/response seam between the orchestrator and the service that owns
//! the Bluetooth radio.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │         Orchestrator         │
//! └──────────────┬───────────────┘
//!                │ dyn Transport
//!        ┌───────┴────────┐
//!        ▼                ▼
//! ┌─────────────┐  ┌──────────────┐      ┌──────────────┐
//! │ IpcTransport│  │  Simulated   │◀─────│    server    │
//! │ (client)    │  │  Transport   │      │ (IPC worker) │
//! └──────┬──────┘  └──────────────┘      └──────▲───────┘
//!        │        JSON lines over local socket   │
//!        └───────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Request and response messages
//! - [`ipc`] - Local socket client
//! - [`server`] - Local socket worker answering requests from a backend
//! - [`simulated`] - In-memory device backend

pub mod ipc;
pub mod protocol;
pub mod server;
pub mod simulated;

use crate::domain::color::Rgb;
use crate::domain::led::LedMode;
use crate::domain::models::{DeviceIdentity, DeviceState, DutyCycle};
use async_trait::async_trait;

pub use crate::domain::error::TransportError;
pub use ipc::IpcTransport;
pub use simulated::SimulatedTransport;

pub type TransportResult<T> = Result<T, TransportError>;

/// Operations offered by the transport service. Every call may fail.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn has_bluetooth(&self) -> TransportResult<bool>;

    async fn is_connected(&self) -> TransportResult<bool>;

    async fn list_devices(&self) -> TransportResult<Vec<DeviceIdentity>>;

    async fn start_discovery(&self) -> TransportResult<()>;

    async fn connect(&self, uuid: &str) -> TransportResult<()>;

    async fn disconnect(&self) -> TransportResult<()>;

    /// Full state of the connected device, absent when there is none
    async fn get_state(&self) -> TransportResult<Option<DeviceState>>;

    /// Ask the device to persist its current settings
    async fn save_state(&self) -> TransportResult<()>;

    async fn set_led(&self, color: Rgb, mode: LedMode) -> TransportResult<()>;

    async fn led_off(&self) -> TransportResult<()>;

    async fn set_fan(&self, duty: DutyCycle) -> TransportResult<()>;

    async fn fan_off(&self) -> TransportResult<()>;

    async fn set_pump(&self, duty: DutyCycle, voltage: u8) -> TransportResult<()>;

    async fn pump_off(&self) -> TransportResult<()>;
}
