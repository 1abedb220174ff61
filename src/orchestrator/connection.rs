//! Connection status transitions and the connect/disconnect lifecycle.

use crate::domain::error::{OrchestratorError, OrchestratorResult, TransportError};
use crate::domain::models::ConnectionStatus;
use crate::orchestrator::{rejected, Orchestrator};
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    BeginDiscovery,
    EndDiscovery,
    BeginConnect,
    ConnectSucceeded,
    ConnectFailed,
    BeginDisconnect,
    DisconnectFinished,
    /// The transport reports a link we did not establish
    LinkDetected,
    /// The transport no longer reports the link
    LinkLost,
}

impl Transition {
    fn action(self) -> &'static str {
        match self {
            Self::BeginDiscovery | Self::EndDiscovery => "refresh devices",
            Self::BeginConnect => "connect",
            Self::ConnectSucceeded | Self::ConnectFailed => "finish connecting",
            Self::BeginDisconnect => "disconnect",
            Self::DisconnectFinished => "finish disconnecting",
            Self::LinkDetected => "adopt link",
            Self::LinkLost => "drop link",
        }
    }
}

impl ConnectionStatus {
    pub fn apply(self, transition: Transition) -> OrchestratorResult<ConnectionStatus> {
        use ConnectionStatus::*;
        use Transition::*;

        match (self, transition) {
            (Disconnected, BeginDiscovery) => Ok(Discovering),
            (Discovering, EndDiscovery) => Ok(Disconnected),
            // A connect claimed the status while the refresh was running
            (Connecting, EndDiscovery) => Ok(Connecting),
            (Disconnected | Discovering, BeginConnect) => Ok(Connecting),
            (Connecting, ConnectSucceeded) => Ok(Connected),
            (Connecting, ConnectFailed) => Ok(Disconnected),
            (Connected, BeginDisconnect) => Ok(Disconnecting),
            (Disconnecting, DisconnectFinished) => Ok(Disconnected),
            (Disconnected | Discovering, LinkDetected) => Ok(Connected),
            (Connected, LinkLost) => Ok(Disconnected),
            (status, transition) => Err(rejected(status, transition.action())),
        }
    }
}

impl Orchestrator {
    /// Connect to `uuid`. Rejected unless disconnected; waits for a running
    /// device refresh before talking to the transport.
    #[instrument(skip(self))]
    pub async fn connect(&self, uuid: &str) -> OrchestratorResult<()> {
        self.transition(Transition::BeginConnect)?;
        info!("Connecting...");

        let _discovery = self.discovery_gate.lock().await;

        if let Err(e) = self.establish_link(uuid).await {
            return Err(self.abandon_connect(e).await);
        }
        // The first state read is part of connecting; a failed read fails the connect
        if let Err(e) = self.read_device_state(ConnectionStatus::Connecting).await {
            return Err(self.abandon_connect(e).await);
        }

        self.update(|s| s.selected_device = Some(uuid.to_string()));
        self.transition(Transition::ConnectSucceeded)?;

        if let Err(e) = self.preferences().record_connected(uuid) {
            warn!("Remembering last connected device failed: {:#}", e);
        }

        info!("Connected");
        Ok(())
    }

    async fn establish_link(&self, uuid: &str) -> OrchestratorResult<()> {
        let failed = |e| OrchestratorError::command_failed("connect", e);

        self.transport.connect(uuid).await.map_err(failed)?;
        if !self.transport.is_connected().await.map_err(failed)? {
            return Err(failed(TransportError::Remote(
                "link did not come up".to_string(),
            )));
        }
        Ok(())
    }

    /// Defensive teardown after a failed connect
    async fn abandon_connect(&self, cause: OrchestratorError) -> OrchestratorError {
        error!("connect failed => {}", cause);
        if let Err(cleanup) = self.transport.disconnect().await {
            warn!("Cleanup disconnect failed: {}", cleanup);
        }
        let _ = self.transition(Transition::ConnectFailed);
        cause
    }

    pub async fn connect_selected(&self) -> OrchestratorResult<()> {
        let snapshot = self.snapshot();
        match snapshot.selected_device {
            Some(uuid) => self.connect(&uuid).await,
            None => Err(rejected(snapshot.status, "connect without a selected device")),
        }
    }

    /// Save device state and tear down the link. Always ends disconnected
    /// once started.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) -> OrchestratorResult<()> {
        self.transition(Transition::BeginDisconnect)?;
        info!("Disconnecting...");

        if let Err(e) = self.transport.save_state().await {
            warn!("Saving device state failed: {}", e);
        }
        if let Err(e) = self.transport.disconnect().await {
            warn!("disconnect failed => {}", e);
        }

        self.transition(Transition::DisconnectFinished)?;
        let selected = self.default_device();
        self.update(|s| s.selected_device = selected);

        info!("Disconnected");
        Ok(())
    }

    /// The connect/disconnect button
    pub async fn toggle_connection(&self) -> OrchestratorResult<()> {
        match self.status() {
            ConnectionStatus::Connected => self.disconnect().await,
            status if status.is_transitioning() => Err(rejected(status, "toggle connection")),
            _ => self.connect_selected().await,
        }
    }

    /// Choose the device the next connect will use
    pub fn select_device(&self, uuid: &str) -> OrchestratorResult<()> {
        let status = self.status();
        if !status.is_idle() {
            return Err(rejected(status, "select a device"));
        }
        self.update(|s| s.selected_device = Some(uuid.to_string()));
        Ok(())
    }

    /// Compare the transport's link state with ours and follow it
    pub(crate) async fn supervise_link(&self) {
        let before = self.status();
        let linked = match self.transport.is_connected().await {
            Ok(linked) => linked,
            Err(e) => {
                warn!("Link status query failed: {}", e);
                return;
            }
        };
        // Anything that moved the status meanwhile owns the outcome
        if self.status() != before {
            return;
        }

        if linked && before.is_idle() {
            if self.transition(Transition::LinkDetected).is_ok() {
                info!("Transport reports an active link");
                let _ = self.reconcile().await;
            }
        } else if !linked && before == ConnectionStatus::Connected {
            warn!("Device link lost");
            let _ = self.transition(Transition::LinkLost);
        }
    }
}
