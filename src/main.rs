mod domain;
mod infrastructure;
mod orchestrator;
mod presentation;

use anyhow::{bail, Context, Result};
use domain::models::DeviceIdentity;
use domain::preferences::PreferenceStore;
use domain::settings::{Settings, SettingsService};
use infrastructure::logging::init_logger;
use infrastructure::storage::JsonFileStore;
use infrastructure::transport::server::run_transport_server;
use infrastructure::transport::{IpcTransport, SimulatedTransport, Transport};
use orchestrator::tasks::spawn_poller;
use orchestrator::{Orchestrator, OrchestratorConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Talk to the transport service over the local socket
    Service,
    /// Drive an in-process simulated device
    Simulate,
    /// Host a simulated transport service on the local socket
    ServeSimulator,
}

fn parse_mode(args: impl IntoIterator<Item = String>) -> Result<Mode> {
    let mut mode = Mode::Service;
    for arg in args {
        mode = match arg.as_str() {
            "--simulate" => Mode::Simulate,
            "--serve-simulator" => Mode::ServeSimulator,
            other => bail!("unknown argument '{}' (expected --simulate or --serve-simulator)", other),
        };
    }
    Ok(mode)
}

fn demo_transport() -> SimulatedTransport {
    SimulatedTransport::new(vec![
        DeviceIdentity::named("5e1d0a42-7c3b-4f0e-9a61-2d8f4b7c1e90", "AQUARIS 4"),
        DeviceIdentity::named("b3f6c8d1-0e2a-4b5c-8d7e-6f1a2b3c4d5e", "AQUARIS 3"),
    ])
    .with_latency(Duration::from_millis(50))
}

fn main() -> Result<()> {
    let mode = parse_mode(std::env::args().skip(1))?;

    let settings_service = SettingsService::new()?;
    if !settings_service.path().exists() {
        if let Err(e) = settings_service.save() {
            eprintln!("Could not write default settings: {:#}", e);
        }
    }
    let settings = settings_service.get().clone();
    let _logging = init_logger(&settings.log_settings)?;
    info!(?mode, "Starting Aquaris control");

    if mode == Mode::ServeSimulator {
        return run_transport_server(&settings.transport.socket_name, Arc::new(demo_transport()));
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(settings, mode))
}

async fn run(settings: Settings, mode: Mode) -> Result<()> {
    let transport: Arc<dyn Transport> = match mode {
        Mode::Simulate => Arc::new(demo_transport()),
        _ => {
            let ipc = IpcTransport::new(settings.transport.socket_name.clone());
            let wait = Duration::from_millis(settings.transport.connect_wait_ms);
            if !ipc.wait_for_service(wait).await {
                warn!(
                    "Transport service not reachable at {}, retrying on every request",
                    settings.transport.socket_name
                );
            }
            Arc::new(ipc)
        }
    };

    let store = JsonFileStore::open_default().context("Failed to open preferences")?;
    let orchestrator = Orchestrator::new(
        transport,
        PreferenceStore::new(Box::new(store)),
        OrchestratorConfig::from(&settings),
    );

    orchestrator.initialize().await;
    let mut poller = spawn_poller(&orchestrator);

    let result = tokio::select! {
        result = presentation::console::run_console(orchestrator.clone()) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            Ok(())
        }
    };

    poller.stop();
    orchestrator.shutdown();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode(args(&[])).unwrap(), Mode::Service);
        assert_eq!(parse_mode(args(&["--simulate"])).unwrap(), Mode::Simulate);
        assert_eq!(
            parse_mode(args(&["--serve-simulator"])).unwrap(),
            Mode::ServeSimulator
        );
        assert!(parse_mode(args(&["--fast"])).is_err());
    }
}
