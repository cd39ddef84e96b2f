//! Actuation Worker
//!
//! Fixed-period loop that asks the arbitrator for the current action and
//! drives the motors with it. Also the dead-man's switch: nothing held means
//! `Stop`, and a set shutdown flag means one last `Stop` and exit.

use super::backend::{apply, DriveSpeeds, MotorBackend};
use crate::command::CommandArbitrator;
use crate::safety::ShutdownFlag;
use rover_shared::{timing, Action};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

/// Configuration for the actuation loop
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Period between backend calls
    pub tick_period: Duration,
    /// Speed magnitudes per direction
    pub speeds: DriveSpeeds,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(timing::TICK_PERIOD_MS),
            speeds: DriveSpeeds::default(),
        }
    }
}

/// What the worker did over its lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    /// Ticks that issued a backend call
    pub ticks: u64,
    /// Ticks whose backend call failed
    pub faults: u64,
    /// Whether the final stop reached the hardware
    pub final_stop_ok: bool,
}

/// Drives the backend from the arbitrator on a fixed clock
pub struct ActuationWorker<B: MotorBackend> {
    backend: B,
    arbitrator: Arc<CommandArbitrator>,
    shutdown: Arc<ShutdownFlag>,
    config: WorkerConfig,
}

impl<B: MotorBackend + 'static> ActuationWorker<B> {
    /// Create a new worker around an initialized backend
    pub fn new(
        backend: B,
        arbitrator: Arc<CommandArbitrator>,
        shutdown: Arc<ShutdownFlag>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            backend,
            arbitrator,
            shutdown,
            config,
        }
    }

    /// Run the loop on its own task
    pub fn spawn(self) -> JoinHandle<WorkerSummary> {
        tokio::spawn(self.run())
    }

    /// Run until the shutdown flag is set, then stop and release the backend
    pub async fn run(mut self) -> WorkerSummary {
        let mut ticker = interval(self.config.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut summary = WorkerSummary::default();
        let mut last_action: Option<Action> = None;
        let mut failing = false;

        info!(
            "[ACTUATION] Worker started: backend={} period={:?}",
            self.backend.name(),
            self.config.tick_period
        );

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.wait() => break,
                _ = ticker.tick() => {}
            }

            // Shutdown may have landed between the wake and here
            if self.shutdown.is_set() {
                break;
            }

            let action = self.arbitrator.current().await;
            if last_action != Some(action) {
                info!("[ACTUATION] Now driving: {}", action);
                last_action = Some(action);
            }

            summary.ticks += 1;
            match apply(&mut self.backend, action, &self.config.speeds) {
                Ok(()) => {
                    if failing {
                        info!("[ACTUATION] Backend recovered");
                        failing = false;
                    }
                }
                Err(e) => {
                    summary.faults += 1;
                    if !failing {
                        error!("[ACTUATION] Failed to apply {}: {}", action, e);
                        failing = true;
                    }
                }
            }
        }

        summary.final_stop_ok = match self.backend.stop() {
            Ok(()) => true,
            Err(e) => {
                error!("[ACTUATION] Final stop failed: {}", e);
                false
            }
        };

        if let Err(e) = self.backend.close() {
            warn!("[ACTUATION] Failed to release backend: {}", e);
        }

        info!(
            "[ACTUATION] Worker stopped: ticks={} faults={}",
            summary.ticks, summary.faults
        );
        summary
    }
}
