//! Link manager - persistent WebSocket link to the hub

use crate::command::CommandArbitrator;
use crate::safety::{ShutdownFlag, ShutdownReason};
use futures::{Sink, SinkExt, Stream, StreamExt};
use rover_shared::{
    codec::{self, Frame},
    state_machine::{LinkEvent, LinkState, LinkStateMachine, TransitionResult},
    timing, CommandEvent,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

/// Socket type produced by [`LinkManager::connect`]
pub type HubSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors that end the process before the link is up
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Failed to connect to {uri}: {source}")]
    Connect {
        uri: String,
        #[source]
        source: tungstenite::Error,
    },

    #[error("Timed out connecting to {uri} after {after:?}")]
    ConnectTimeout { uri: String, after: Duration },
}

/// Configuration for the hub link
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Hub host name or address
    pub host: String,
    /// Hub port
    pub port: u16,
    /// Route on the hub identifying this device
    pub route: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Link is dropped after this long without any inbound frame
    pub idle_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.24".into(),
            port: 8080,
            route: "rpiConnect".into(),
            connect_timeout: Duration::from_millis(timing::CONNECT_TIMEOUT_MS),
            idle_timeout: Duration::from_millis(timing::IDLE_TIMEOUT_MS),
        }
    }
}

impl LinkConfig {
    /// WebSocket URI of the hub route
    pub fn uri(&self) -> String {
        format!(
            "ws://{}:{}/{}",
            self.host,
            self.port,
            self.route.trim_start_matches('/')
        )
    }
}

/// How the receive loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEnd {
    /// Close frame or end of stream
    PeerClosed,
    /// Read or write failed
    IoFault(String),
    /// Nothing arrived within the idle timeout
    IdleTimeout,
    /// Shutdown flag was set by someone else
    Shutdown,
}

impl fmt::Display for LinkEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkEnd::PeerClosed => write!(f, "peer closed"),
            LinkEnd::IoFault(reason) => write!(f, "I/O fault: {}", reason),
            LinkEnd::IdleTimeout => write!(f, "idle timeout"),
            LinkEnd::Shutdown => write!(f, "shutdown requested"),
        }
    }
}

impl LinkEnd {
    fn to_event(&self) -> LinkEvent {
        match self {
            LinkEnd::PeerClosed => LinkEvent::PeerClosed,
            LinkEnd::IoFault(reason) => LinkEvent::IoFault {
                reason: reason.clone(),
            },
            LinkEnd::IdleTimeout => LinkEvent::IdleTimeout,
            LinkEnd::Shutdown => LinkEvent::ShutdownRequested,
        }
    }
}

/// Frame counters for the exit summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Frames received of any kind
    pub frames: u64,
    /// Liveness probes answered with `pong`
    pub pings: u64,
    /// Press/release events handed to the arbitrator
    pub commands: u64,
    /// Frames that failed to decode or arrived outside CONNECTED
    pub dropped: u64,
}

/// Owns the hub connection and feeds press/release events to the arbitrator
pub struct LinkManager {
    config: LinkConfig,
    arbitrator: Arc<CommandArbitrator>,
    shutdown: Arc<ShutdownFlag>,
    fsm: LinkStateMachine,
    stats: LinkStats,
}

impl LinkManager {
    /// Create a new link manager in DISCONNECTED state
    pub fn new(
        config: LinkConfig,
        arbitrator: Arc<CommandArbitrator>,
        shutdown: Arc<ShutdownFlag>,
    ) -> Self {
        Self {
            config,
            arbitrator,
            shutdown,
            fsm: LinkStateMachine::new(),
            stats: LinkStats::default(),
        }
    }

    /// Current link state
    pub fn state(&self) -> LinkState {
        self.fsm.state()
    }

    /// Frame counters so far
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Open the WebSocket to the hub. No retry: failure is fatal.
    pub async fn connect(&mut self) -> Result<HubSocket, LinkError> {
        let uri = self.config.uri();
        self.transition(LinkEvent::ConnectRequested);
        info!("[LINK] Connecting to {}", uri);

        let result = match timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(uri.as_str()),
        )
        .await
        {
            Ok(Ok((socket, _response))) => Ok(socket),
            Ok(Err(source)) => Err(LinkError::Connect {
                uri: uri.clone(),
                source,
            }),
            Err(_) => Err(LinkError::ConnectTimeout {
                uri: uri.clone(),
                after: self.config.connect_timeout,
            }),
        };

        match &result {
            Ok(_) => {
                self.transition(LinkEvent::Established);
                info!("[LINK] Connected to {}", uri);
            }
            Err(e) => {
                self.transition(LinkEvent::ConnectFailed {
                    reason: e.to_string(),
                });
            }
        }
        result
    }

    /// Run the receive loop on a connected socket
    pub async fn run_socket(&mut self, socket: HubSocket) -> LinkEnd {
        let (outbound, inbound) = socket.split();
        self.run(inbound, outbound).await
    }

    /// Receive loop. Returns when the link is gone; the shutdown flag is
    /// always set by then.
    pub async fn run<S, E, K>(&mut self, mut inbound: S, mut outbound: K) -> LinkEnd
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: fmt::Display,
        K: Sink<Message> + Unpin,
        K::Error: fmt::Display,
    {
        let end = loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.wait() => break LinkEnd::Shutdown,
                next = timeout(self.config.idle_timeout, inbound.next()) => next,
            };

            let message = match next {
                Err(_) => break LinkEnd::IdleTimeout,
                Ok(None) => break LinkEnd::PeerClosed,
                Ok(Some(Err(e))) => break LinkEnd::IoFault(e.to_string()),
                Ok(Some(Ok(message))) => message,
            };
            self.stats.frames += 1;

            let decoded = match message {
                Message::Text(text) => codec::decode(text.as_str()),
                Message::Binary(data) => codec::decode_bytes(&data),
                // Protocol-level ping/pong is answered by tungstenite
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                Message::Close(frame) => {
                    debug!("[LINK] Close frame: {:?}", frame);
                    break LinkEnd::PeerClosed;
                }
            };

            match decoded {
                Ok(Frame::Ping) => {
                    if let Err(e) = outbound.send(Message::Text(codec::PONG.into())).await {
                        break LinkEnd::IoFault(format!("pong send failed: {}", e));
                    }
                    self.stats.pings += 1;
                    debug!("[LINK] ping -> pong");
                }
                Ok(Frame::Command(event)) => self.dispatch(event).await,
                Err(e) if e.is_unknown_action() => {
                    warn!("[LINK] Dropping command: {}", e);
                    self.stats.dropped += 1;
                }
                Err(e) => {
                    warn!("[LINK] Dropping undecodable frame: {}", e);
                    self.stats.dropped += 1;
                }
            }
        };

        self.transition(end.to_event());
        self.shutdown.trigger(ShutdownReason::ConnectionLost {
            reason: end.to_string(),
        });

        if end == LinkEnd::Shutdown {
            // Best effort: tell the hub we are leaving
            if let Err(e) = outbound.close().await {
                debug!("[LINK] Close failed: {}", e);
            }
        }

        let held = self.arbitrator.snapshot().await;
        if !held.is_empty() {
            info!("[LINK] Releasing held actions: {:?}", held);
        }
        self.arbitrator.clear().await;
        self.transition(LinkEvent::Released);

        info!(
            "[LINK] Link ended ({}): frames={} pings={} commands={} dropped={}",
            end, self.stats.frames, self.stats.pings, self.stats.commands, self.stats.dropped
        );
        end
    }

    async fn dispatch(&mut self, event: CommandEvent) {
        if !self.fsm.dispatches_commands() {
            warn!(
                "[LINK] Dropping {:?} in state {}",
                event,
                self.fsm.state()
            );
            self.stats.dropped += 1;
            return;
        }

        debug!(
            "[LINK] {} {}",
            event.action,
            if event.pressed { "pressed" } else { "released" }
        );

        if event.pressed {
            self.arbitrator.activate(event.action).await;
        } else {
            self.arbitrator.deactivate(event.action).await;
        }
        self.stats.commands += 1;
    }

    fn transition(&mut self, event: LinkEvent) {
        let from = self.fsm.state();
        match self.fsm.process_event(event) {
            TransitionResult::Success(to) => debug!("[LINK] {} -> {}", from, to),
            TransitionResult::Invalid { from, event } => {
                error!("[LINK] Invalid transition from {}: {:?}", from, event)
            }
        }
    }
}
