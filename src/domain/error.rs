use crate::domain::models::ConnectionStatus;
use thiserror::Error;

/// Failure reported by a transport service call
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed transport message: {0}")]
    Protocol(String),
    #[error("transport service reported: {0}")]
    Remote(String),
    #[error("transport service is not reachable")]
    Unavailable,
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("bluetooth is not available")]
    TransportUnavailable,
    #[error("cannot {action} while {status}")]
    OperationRejected {
        status: ConnectionStatus,
        action: &'static str,
    },
    #[error("{operation} failed: {source}")]
    DeviceCommandFailed {
        operation: &'static str,
        #[source]
        source: TransportError,
    },
    #[error("no device connected")]
    NotConnected,
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl OrchestratorError {
    pub fn command_failed(operation: &'static str, source: TransportError) -> Self {
        Self::DeviceCommandFailed { operation, source }
    }

    /// Rejections that are only visible through the unchanged status
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::OperationRejected { .. } | Self::NotConnected)
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
