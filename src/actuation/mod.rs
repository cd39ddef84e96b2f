//! Motor actuation
//!
//! This module handles:
//! - The motor backend boundary and its implementations
//! - The fixed-rate worker that drives the backend from the arbitrator
//! - The final stop on shutdown

mod backend;
mod rvr;
mod simulated;
mod worker;

pub use backend::{BackendError, DriveSpeeds, MotorBackend};
pub use rvr::{RvrBackend, RvrConfig};
pub use simulated::SimulatedBackend;
pub use worker::{ActuationWorker, WorkerConfig};

#[cfg(test)]
pub(crate) use backend::testing;
