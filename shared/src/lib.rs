//! Rover Shared Protocol Types
//!
//! This crate provides the wire types, the JSON frame codec and the link
//! state machine used by the rover remote-drive client.

pub mod codec;
pub mod state_machine;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Timing and drive parameters for the system
pub mod timing {
    /// Actuation tick period in milliseconds (10 Hz)
    pub const TICK_PERIOD_MS: u64 = 100;

    /// Interval at which the hub sends its `ping` text frame
    pub const HUB_PING_INTERVAL_MS: u64 = 3000;

    /// Link is considered dead after this long without any inbound frame
    pub const IDLE_TIMEOUT_MS: u64 = 3 * HUB_PING_INTERVAL_MS;

    /// Time allowed for the WebSocket handshake
    pub const CONNECT_TIMEOUT_MS: u64 = 5000;

    /// Default straight-line motor speed (0-255)
    pub const FORWARD_SPEED: u8 = 50;

    /// Default turning motor speed (0-255)
    pub const TURN_SPEED: u8 = 50;
}

/// One of the discrete motion commands the robot accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Action {
    /// Every action, in wire-table order
    pub const ALL: [Action; 5] = [
        Action::Forward,
        Action::Backward,
        Action::Left,
        Action::Right,
        Action::Stop,
    ];

    /// Name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Forward => "forward",
            Action::Backward => "backward",
            Action::Left => "left",
            Action::Right => "right",
            Action::Stop => "stop",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a wire name is not one of the known actions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown action: {0:?}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// A press or release of a remote control input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEvent {
    pub action: Action,
    pub pressed: bool,
}

impl CommandEvent {
    /// Create a press event
    pub fn pressed(action: Action) -> Self {
        Self {
            action,
            pressed: true,
        }
    }

    /// Create a release event
    pub fn released(action: Action) -> Self {
        Self {
            action,
            pressed: false,
        }
    }
}
