//! Link State Machine
//!
//! Defines valid transitions of the persistent hub connection. Commands are
//! only dispatched while the link is `Connected`.

use std::fmt;

/// Lifecycle of the hub connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Closed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "DISCONNECTED",
            LinkState::Connecting => "CONNECTING",
            LinkState::Connected => "CONNECTED",
            LinkState::Closing => "CLOSING",
            LinkState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Connection attempt started
    ConnectRequested,
    /// Handshake completed
    Established,
    /// Connection could not be established
    ConnectFailed { reason: String },
    /// Peer sent a close frame or ended the stream
    PeerClosed,
    /// Read or write failed
    IoFault { reason: String },
    /// No inbound frame within the idle timeout
    IdleTimeout,
    /// Local shutdown (e.g. Ctrl-C)
    ShutdownRequested,
    /// Socket dropped
    Released,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(LinkState),
    /// Transition was invalid from current state
    Invalid { from: LinkState, event: LinkEvent },
}

/// The connection state machine
#[derive(Debug)]
pub struct LinkStateMachine {
    current_state: LinkState,
}

impl Default for LinkStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStateMachine {
    /// Create a new state machine in Disconnected state
    pub fn new() -> Self {
        Self {
            current_state: LinkState::Disconnected,
        }
    }

    /// Get current state
    pub fn state(&self) -> LinkState {
        self.current_state
    }

    /// Whether command events may reach the arbitrator
    pub fn dispatches_commands(&self) -> bool {
        self.current_state == LinkState::Connected
    }

    /// Whether the link has reached its terminal state
    pub fn is_closed(&self) -> bool {
        self.current_state == LinkState::Closed
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: LinkEvent) -> TransitionResult {
        match self.get_next_state(&event) {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn get_next_state(&self, event: &LinkEvent) -> Option<LinkState> {
        use LinkEvent::*;
        use LinkState::*;

        match (self.current_state, event) {
            (Disconnected, ConnectRequested) => Some(Connecting),

            (Connecting, Established) => Some(Connected),
            // No retry: a failed connect is terminal for the process
            (Connecting, ConnectFailed { .. }) => Some(Closed),

            (Connected, PeerClosed | IoFault { .. } | IdleTimeout | ShutdownRequested) => {
                Some(Closing)
            }

            (Closing, Released) => Some(Closed),

            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> LinkStateMachine {
        let mut fsm = LinkStateMachine::new();
        fsm.process_event(LinkEvent::ConnectRequested);
        fsm.process_event(LinkEvent::Established);
        fsm
    }

    #[test]
    fn test_initial_state() {
        let fsm = LinkStateMachine::new();
        assert_eq!(fsm.state(), LinkState::Disconnected);
        assert!(!fsm.dispatches_commands());
    }

    #[test]
    fn test_normal_lifecycle() {
        let mut fsm = LinkStateMachine::new();

        let result = fsm.process_event(LinkEvent::ConnectRequested);
        assert_eq!(result, TransitionResult::Success(LinkState::Connecting));
        assert!(!fsm.dispatches_commands());

        let result = fsm.process_event(LinkEvent::Established);
        assert_eq!(result, TransitionResult::Success(LinkState::Connected));
        assert!(fsm.dispatches_commands());

        let result = fsm.process_event(LinkEvent::PeerClosed);
        assert_eq!(result, TransitionResult::Success(LinkState::Closing));
        assert!(!fsm.dispatches_commands());

        let result = fsm.process_event(LinkEvent::Released);
        assert_eq!(result, TransitionResult::Success(LinkState::Closed));
        assert!(fsm.is_closed());
    }

    #[test]
    fn test_connect_failure_is_terminal() {
        let mut fsm = LinkStateMachine::new();
        fsm.process_event(LinkEvent::ConnectRequested);

        let result = fsm.process_event(LinkEvent::ConnectFailed {
            reason: "refused".into(),
        });
        assert_eq!(result, TransitionResult::Success(LinkState::Closed));

        // No way back
        let result = fsm.process_event(LinkEvent::ConnectRequested);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert!(fsm.is_closed());
    }

    #[test]
    fn test_every_fault_closes_link() {
        for event in [
            LinkEvent::PeerClosed,
            LinkEvent::IoFault {
                reason: "reset".into(),
            },
            LinkEvent::IdleTimeout,
            LinkEvent::ShutdownRequested,
        ] {
            let mut fsm = connected();
            assert_eq!(
                fsm.process_event(event),
                TransitionResult::Success(LinkState::Closing)
            );
        }
    }

    #[test]
    fn test_invalid_transition() {
        let mut fsm = LinkStateMachine::new();

        // Can't be established without connecting first
        let result = fsm.process_event(LinkEvent::Established);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(fsm.state(), LinkState::Disconnected);
    }
}
