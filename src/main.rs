mod actuation;
mod command;
mod config;
mod connection;
mod safety;
mod startup;

use actuation::{ActuationWorker, MotorBackend, RvrBackend, SimulatedBackend};
use command::CommandArbitrator;
use config::{BackendKind, Settings};
use connection::LinkManager;
use safety::{ShutdownFlag, ShutdownReason};
use startup::StartupError;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Rover client starting");
    info!("  Hub: {}", settings.link.uri());
    info!(
        "  Tick: {:?}, speeds: straight={} turn={}",
        settings.worker.tick_period, settings.worker.speeds.straight, settings.worker.speeds.turn
    );

    // Hardware first: without motors there is nothing to drive
    let mut backend = match open_backend(&settings) {
        Ok(backend) => backend,
        Err(e) => {
            error!("Backend initialization failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Motor backend ready: {}", backend.name());

    let arbitrator = Arc::new(CommandArbitrator::new(settings.policy));
    info!("Arbitration policy: {}", arbitrator.policy());
    let shutdown = Arc::new(ShutdownFlag::new());

    // External interrupt takes the same path as a lost link
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                shutdown_clone.trigger(ShutdownReason::Interrupted);
            }
            Err(e) => warn!("Ctrl-C handler unavailable: {}", e),
        }
    });

    let mut link = LinkManager::new(settings.link.clone(), arbitrator.clone(), shutdown.clone());
    let wake_settle = match settings.backend {
        BackendKind::Rvr => settings.rvr.wake_settle,
        BackendKind::Simulated => Duration::ZERO,
    };

    let socket = match startup::bring_up(&mut link, backend.as_mut(), &shutdown, wake_settle).await {
        Ok(socket) => socket,
        Err(StartupError::Interrupted) => {
            info!("Shutdown complete (interrupted during startup): link={}", link.state());
            return ExitCode::SUCCESS;
        }
        // Already logged, backend already released
        Err(_) => return ExitCode::FAILURE,
    };

    let worker = ActuationWorker::new(
        backend,
        arbitrator.clone(),
        shutdown.clone(),
        settings.worker.clone(),
    )
    .spawn();

    let end = link.run_socket(socket).await;

    let summary = match worker.await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Actuation worker panicked: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let stats = link.stats();
    info!(
        "Shutdown complete ({}): reason={} link={} ticks={} faults={} final_stop={} frames={} commands={} dropped={}",
        end,
        shutdown
            .reason()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown".into()),
        link.state(),
        summary.ticks,
        summary.faults,
        if summary.final_stop_ok { "ok" } else { "FAILED" },
        stats.frames,
        stats.commands,
        stats.dropped,
    );

    if summary.final_stop_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Open the configured motor backend
fn open_backend(settings: &Settings) -> Result<Box<dyn MotorBackend>, actuation::BackendError> {
    match settings.backend {
        BackendKind::Rvr => Ok(Box::new(RvrBackend::open(&settings.rvr)?)),
        BackendKind::Simulated => Ok(Box::new(SimulatedBackend::new())),
    }
}
