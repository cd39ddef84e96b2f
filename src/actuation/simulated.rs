//! Simulated backend for running without drive hardware

use super::backend::{BackendError, MotorBackend};
use tracing::debug;

/// Logs every call and tracks the last commanded motion
#[derive(Debug, Default)]
pub struct SimulatedBackend {
    last: Option<(&'static str, u8)>,
    closed: bool,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last commanded motion and speed
    pub fn last(&self) -> Option<(&'static str, u8)> {
        self.last
    }

    fn drive(&mut self, op: &'static str, speed: u8) -> Result<(), BackendError> {
        if self.closed {
            return Err(BackendError::Closed);
        }
        if self.last != Some((op, speed)) {
            debug!("[SIM] {} speed={}", op, speed);
        }
        self.last = Some((op, speed));
        Ok(())
    }
}

impl MotorBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "Simulated"
    }

    fn forward(&mut self, speed: u8) -> Result<(), BackendError> {
        self.drive("forward", speed)
    }

    fn backward(&mut self, speed: u8) -> Result<(), BackendError> {
        self.drive("backward", speed)
    }

    fn left(&mut self, speed: u8) -> Result<(), BackendError> {
        self.drive("left", speed)
    }

    fn right(&mut self, speed: u8) -> Result<(), BackendError> {
        self.drive("right", speed)
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        self.drive("stop", 0)
    }

    fn close(&mut self) -> Result<(), BackendError> {
        debug!("[SIM] closed, last={:?}", self.last());
        self.closed = true;
        Ok(())
    }
}
