//! Local socket client for an out-of-process transport service.

use crate::domain::color::Rgb;
use crate::domain::led::LedMode;
use crate::domain::models::{DeviceIdentity, DeviceState, DutyCycle};
use crate::infrastructure::transport::protocol::{TransportRequest, TransportResponse};
use crate::infrastructure::transport::{Transport, TransportError, TransportResult};
use async_trait::async_trait;
use interprocess::local_socket::{
    traits::Stream, GenericFilePath, GenericNamespaced, Name, Stream as LocalStream, ToFsName,
    ToNsName,
};
use std::io::{self, BufRead, BufReader, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Resolve a socket name. A leading `@` selects the namespaced form.
pub fn resolve_socket_name(name: &str) -> io::Result<Name<'_>> {
    match name.strip_prefix('@') {
        Some(namespaced) => namespaced.to_ns_name::<GenericNamespaced>(),
        None => name.to_fs_name::<GenericFilePath>(),
    }
}

pub struct IpcTransport {
    socket_name: String,
    stream: Arc<Mutex<Option<LocalStream>>>,
}

impl IpcTransport {
    pub fn new(socket_name: impl Into<String>) -> Self {
        Self {
            socket_name: socket_name.into(),
            stream: Arc::new(Mutex::new(None)),
        }
    }

    /// Poll until the service accepts a connection or `timeout` elapses
    pub async fn wait_for_service(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            match open(&self.socket_name) {
                Ok(stream) => {
                    info!("Connected to transport service at {}", self.socket_name);
                    if let Ok(mut guard) = self.stream.lock() {
                        *guard = Some(stream);
                    }
                    return true;
                }
                Err(e) => trace!("Transport service not ready: {}", e),
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        false
    }

    async fn request(&self, request: TransportRequest) -> TransportResult<TransportResponse> {
        let socket_name = self.socket_name.clone();
        let stream = self.stream.clone();
        tokio::task::spawn_blocking(move || exchange(&socket_name, &stream, &request))
            .await
            .map_err(|e| TransportError::Io(io::Error::other(e)))?
    }
}

fn open(socket_name: &str) -> io::Result<LocalStream> {
    LocalStream::connect(resolve_socket_name(socket_name)?)
}

/// Send one request, reopening the socket once if the existing one is dead
fn exchange(
    socket_name: &str,
    stream: &Mutex<Option<LocalStream>>,
    request: &TransportRequest,
) -> TransportResult<TransportResponse> {
    let mut guard = stream
        .lock()
        .map_err(|_| TransportError::Protocol("transport client lock poisoned".to_string()))?;

    let reused = guard.is_some();
    if !reused {
        *guard = Some(open(socket_name).map_err(|_| TransportError::Unavailable)?);
    }

    let Some(current) = guard.as_mut() else {
        return Err(TransportError::Unavailable);
    };
    match send_line(current, request) {
        Ok(response) => Ok(response),
        Err(TransportError::Io(e)) if reused => {
            warn!("Transport connection lost ({}), reconnecting", e);
            *guard = None;
            let mut fresh = open(socket_name).map_err(|_| TransportError::Unavailable)?;
            let response = send_line(&mut fresh, request);
            *guard = Some(fresh);
            response
        }
        Err(e) => {
            *guard = None;
            Err(e)
        }
    }
}

fn send_line(
    stream: &mut LocalStream,
    request: &TransportRequest,
) -> TransportResult<TransportResponse> {
    let json = serde_json::to_string(request)? + "\n";
    debug!("-> {}", json.trim_end());

    stream.write_all(json.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut buffer = String::new();
    if reader.read_line(&mut buffer)? == 0 {
        return Err(TransportError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "transport service closed the connection",
        )));
    }
    debug!("<- {}", buffer.trim_end());

    Ok(serde_json::from_str(&buffer)?)
}

#[async_trait]
impl Transport for IpcTransport {
    async fn has_bluetooth(&self) -> TransportResult<bool> {
        self.request(TransportRequest::HasBluetooth).await?.into_flag()
    }

    async fn is_connected(&self) -> TransportResult<bool> {
        self.request(TransportRequest::IsConnected).await?.into_flag()
    }

    async fn list_devices(&self) -> TransportResult<Vec<DeviceIdentity>> {
        self.request(TransportRequest::ListDevices).await?.into_devices()
    }

    async fn start_discovery(&self) -> TransportResult<()> {
        self.request(TransportRequest::StartDiscovery).await?.into_done()
    }

    async fn connect(&self, uuid: &str) -> TransportResult<()> {
        self.request(TransportRequest::Connect {
            uuid: uuid.to_string(),
        })
        .await?
        .into_done()
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.request(TransportRequest::Disconnect).await?.into_done()
    }

    async fn get_state(&self) -> TransportResult<Option<DeviceState>> {
        self.request(TransportRequest::GetState).await?.into_state()
    }

    async fn save_state(&self) -> TransportResult<()> {
        self.request(TransportRequest::SaveState).await?.into_done()
    }

    async fn set_led(&self, color: Rgb, mode: LedMode) -> TransportResult<()> {
        self.request(TransportRequest::SetLed { color, mode })
            .await?
            .into_done()
    }

    async fn led_off(&self) -> TransportResult<()> {
        self.request(TransportRequest::LedOff).await?.into_done()
    }

    async fn set_fan(&self, duty: DutyCycle) -> TransportResult<()> {
        self.request(TransportRequest::SetFan { duty }).await?.into_done()
    }

    async fn fan_off(&self) -> TransportResult<()> {
        self.request(TransportRequest::FanOff).await?.into_done()
    }

    async fn set_pump(&self, duty: DutyCycle, voltage: u8) -> TransportResult<()> {
        self.request(TransportRequest::SetPump { duty, voltage })
            .await?
            .into_done()
    }

    async fn pump_off(&self) -> TransportResult<()> {
        self.request(TransportRequest::PumpOff).await?.into_done()
    }
}
