//! Transport IPC messages
//!
//! One JSON document per line in each direction. Every request is answered by
//! exactly one response.

use crate::domain::color::Rgb;
use crate::domain::led::LedMode;
use crate::domain::models::{DeviceIdentity, DeviceState, DutyCycle};
use crate::infrastructure::transport::{TransportError, TransportResult};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum TransportRequest {
    HasBluetooth,
    IsConnected,
    ListDevices,
    StartDiscovery,
    Connect { uuid: String },
    Disconnect,
    GetState,
    SaveState,
    SetLed { color: Rgb, mode: LedMode },
    LedOff,
    SetFan { duty: DutyCycle },
    FanOff,
    SetPump { duty: DutyCycle, voltage: u8 },
    PumpOff,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum TransportResponse {
    Done,
    Flag(bool),
    Devices(Vec<DeviceIdentity>),
    State(Option<DeviceState>),
    Error(String),
}

impl TransportResponse {
    pub fn from_result<T>(result: TransportResult<T>, wrap: impl FnOnce(T) -> Self) -> Self {
        match result {
            Ok(value) => wrap(value),
            Err(e) => Self::Error(e.to_string()),
        }
    }

    pub fn into_done(self) -> TransportResult<()> {
        match self {
            Self::Done => Ok(()),
            other => Err(other.unexpected("Done")),
        }
    }

    pub fn into_flag(self) -> TransportResult<bool> {
        match self {
            Self::Flag(value) => Ok(value),
            other => Err(other.unexpected("Flag")),
        }
    }

    pub fn into_devices(self) -> TransportResult<Vec<DeviceIdentity>> {
        match self {
            Self::Devices(devices) => Ok(devices),
            other => Err(other.unexpected("Devices")),
        }
    }

    pub fn into_state(self) -> TransportResult<Option<DeviceState>> {
        match self {
            Self::State(state) => Ok(state),
            other => Err(other.unexpected("State")),
        }
    }

    fn unexpected(self, expected: &str) -> TransportError {
        match self {
            Self::Error(message) => TransportError::Remote(message),
            other => TransportError::Protocol(format!("expected {}, got {:?}", expected, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_wire_format() {
        let request = TransportRequest::SetLed {
            color: Rgb::new(0, 255, 0),
            mode: LedMode::Colorful,
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"SetLed":{"color":{"red":0,"green":255,"blue":0},"mode":"Colorful"}}"#
        );
        assert_eq!(serde_json::to_string(&TransportRequest::FanOff).unwrap(), r#""FanOff""#);
    }

    #[test]
    fn test_error_response_becomes_remote_error() {
        let err = TransportResponse::Error("radio busy".to_string())
            .into_done()
            .unwrap_err();
        assert!(matches!(err, TransportError::Remote(ref m) if m == "radio busy"));
    }

    #[test]
    fn test_mismatched_response_is_protocol_error() {
        let err = TransportResponse::Done.into_flag().unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }
}
