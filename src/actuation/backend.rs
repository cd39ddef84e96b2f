//! Motor backend abstraction for pluggable drive hardware

use rover_shared::{timing, Action};
use thiserror::Error;

/// Errors raised by a motor backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Backend initialization failed: {0}")]
    Init(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend already closed")]
    Closed,
}

/// Drive hardware. Calls are short synchronous writes and are idempotent:
/// issuing the same call every tick keeps the motors in that state.
pub trait MotorBackend: Send {
    /// Human-readable name for this backend
    fn name(&self) -> &'static str;

    fn forward(&mut self, speed: u8) -> Result<(), BackendError>;

    fn backward(&mut self, speed: u8) -> Result<(), BackendError>;

    /// Spin in place counter-clockwise
    fn left(&mut self, speed: u8) -> Result<(), BackendError>;

    /// Spin in place clockwise
    fn right(&mut self, speed: u8) -> Result<(), BackendError>;

    fn stop(&mut self) -> Result<(), BackendError>;

    /// Bring the hardware out of standby before the first drive call
    fn wake(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Release the hardware. The backend must not be driven afterwards.
    fn close(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}

impl<B: MotorBackend + ?Sized> MotorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn forward(&mut self, speed: u8) -> Result<(), BackendError> {
        (**self).forward(speed)
    }

    fn backward(&mut self, speed: u8) -> Result<(), BackendError> {
        (**self).backward(speed)
    }

    fn left(&mut self, speed: u8) -> Result<(), BackendError> {
        (**self).left(speed)
    }

    fn right(&mut self, speed: u8) -> Result<(), BackendError> {
        (**self).right(speed)
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        (**self).stop()
    }

    fn wake(&mut self) -> Result<(), BackendError> {
        (**self).wake()
    }

    fn close(&mut self) -> Result<(), BackendError> {
        (**self).close()
    }
}

/// Per-direction speed magnitudes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveSpeeds {
    /// Used for forward and backward
    pub straight: u8,
    /// Used for left and right
    pub turn: u8,
}

impl Default for DriveSpeeds {
    fn default() -> Self {
        Self {
            straight: timing::FORWARD_SPEED,
            turn: timing::TURN_SPEED,
        }
    }
}

/// Issue the backend call matching an action
pub fn apply<B: MotorBackend + ?Sized>(
    backend: &mut B,
    action: Action,
    speeds: &DriveSpeeds,
) -> Result<(), BackendError> {
    match action {
        Action::Forward => backend.forward(speeds.straight),
        Action::Backward => backend.backward(speeds.straight),
        Action::Left => backend.left(speeds.turn),
        Action::Right => backend.right(speeds.turn),
        Action::Stop => backend.stop(),
    }
}
