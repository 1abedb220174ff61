//! Transport worker: answers IPC requests from a local backend.

use crate::infrastructure::transport::ipc::resolve_socket_name;
use crate::infrastructure::transport::protocol::{TransportRequest, TransportResponse};
use crate::infrastructure::transport::Transport;
use anyhow::Result;
use interprocess::local_socket::{traits::ListenerExt, ListenerOptions, Stream as LocalStream};
use interprocess::TryClone;
use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{error, info, warn};

/// Serve connections one at a time until the listener fails
pub fn run_transport_server(socket_name: &str, backend: Arc<dyn Transport>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let listener = ListenerOptions::new()
        .name(resolve_socket_name(socket_name)?)
        .create_sync()?;

    info!("Transport service listening on {}", socket_name);

    for conn in listener.incoming().filter_map(|x| x.ok()) {
        info!("Client connected");
        if let Err(e) = handle_connection(conn, &runtime, backend.as_ref()) {
            error!("Connection error: {}", e);
        }
        info!("Client disconnected");
    }

    Ok(())
}

fn handle_connection(mut stream: LocalStream, runtime: &Runtime, backend: &dyn Transport) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut buffer = String::new();

    loop {
        buffer.clear();
        if reader.read_line(&mut buffer)? == 0 {
            break;
        }

        let response = match serde_json::from_str::<TransportRequest>(&buffer) {
            Ok(request) => runtime.block_on(answer(backend, request)),
            Err(e) => {
                warn!("Unreadable request: {}", e);
                TransportResponse::Error(format!("unreadable request: {}", e))
            }
        };

        let json = serde_json::to_string(&response)? + "\n";
        stream.write_all(json.as_bytes())?;
        stream.flush()?;
    }
    Ok(())
}

/// Run one request against the backend
pub async fn answer(backend: &dyn Transport, request: TransportRequest) -> TransportResponse {
    use TransportResponse as R;

    match request {
        TransportRequest::HasBluetooth => R::from_result(backend.has_bluetooth().await, R::Flag),
        TransportRequest::IsConnected => R::from_result(backend.is_connected().await, R::Flag),
        TransportRequest::ListDevices => R::from_result(backend.list_devices().await, R::Devices),
        TransportRequest::StartDiscovery => {
            R::from_result(backend.start_discovery().await, |_| R::Done)
        }
        TransportRequest::Connect { uuid } => {
            R::from_result(backend.connect(&uuid).await, |_| R::Done)
        }
        TransportRequest::Disconnect => R::from_result(backend.disconnect().await, |_| R::Done),
        TransportRequest::GetState => R::from_result(backend.get_state().await, R::State),
        TransportRequest::SaveState => R::from_result(backend.save_state().await, |_| R::Done),
        TransportRequest::SetLed { color, mode } => {
            R::from_result(backend.set_led(color, mode).await, |_| R::Done)
        }
        TransportRequest::LedOff => R::from_result(backend.led_off().await, |_| R::Done),
        TransportRequest::SetFan { duty } => {
            R::from_result(backend.set_fan(duty).await, |_| R::Done)
        }
        TransportRequest::FanOff => R::from_result(backend.fan_off().await, |_| R::Done),
        TransportRequest::SetPump { duty, voltage } => {
            R::from_result(backend.set_pump(duty, voltage).await, |_| R::Done)
        }
        TransportRequest::PumpOff => R::from_result(backend.pump_off().await, |_| R::Done),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{DeviceIdentity, DutyCycle};
    use crate::infrastructure::transport::simulated::{SimulatedTransport, TransportCall};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_answer_routes_to_backend() {
        let backend = SimulatedTransport::new(vec![DeviceIdentity::new("A")]);

        let devices = answer(&backend, TransportRequest::ListDevices).await;
        assert_eq!(devices, TransportResponse::Devices(vec![DeviceIdentity::new("A")]));

        answer(&backend, TransportRequest::Connect { uuid: "A".to_string() }).await;
        let done = answer(
            &backend,
            TransportRequest::SetFan {
                duty: DutyCycle::clamped(40),
            },
        )
        .await;
        assert_eq!(done, TransportResponse::Done);
        assert!(backend
            .calls()
            .contains(&TransportCall::SetFan(DutyCycle::clamped(40))));
    }

    #[tokio::test]
    async fn test_answer_reports_backend_errors() {
        let backend = SimulatedTransport::new(vec![]);
        let response = answer(&backend, TransportRequest::Connect { uuid: "missing".to_string() }).await;
        assert!(matches!(response, TransportResponse::Error(_)));
    }
}
