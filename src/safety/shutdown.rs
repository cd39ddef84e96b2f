//! Shutdown Flag
//!
//! Monotonic stop signal. Once set it is never cleared; the first reason
//! recorded wins.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Why the process is shutting down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Peer closed or the link faulted
    ConnectionLost { reason: String },
    /// External interrupt (Ctrl-C)
    Interrupted,
    /// Fatal startup error
    Fatal { reason: String },
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::ConnectionLost { reason } => write!(f, "connection lost: {}", reason),
            ShutdownReason::Interrupted => write!(f, "interrupted"),
            ShutdownReason::Fatal { reason } => write!(f, "fatal: {}", reason),
        }
    }
}

/// Process-wide shutdown signal
#[derive(Debug, Default)]
pub struct ShutdownFlag {
    set: AtomicBool,
    reason: OnceLock<ShutdownReason>,
    notify: Notify,
}

impl ShutdownFlag {
    /// Create a cleared flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns true if this call was the one that set it.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        if self.set.swap(true, Ordering::SeqCst) {
            return false;
        }

        if reason == ShutdownReason::Interrupted {
            info!("[SHUTDOWN] Triggered: {}", reason);
        } else {
            warn!("[SHUTDOWN] Triggered: {}", reason);
        }
        let _ = self.reason.set(reason);
        self.notify.notify_waiters();
        true
    }

    /// Whether shutdown has been requested
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::SeqCst)
    }

    /// The reason recorded by the first trigger
    pub fn reason(&self) -> Option<&ShutdownReason> {
        self.reason.get()
    }

    /// Wait until the flag is set
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent trigger is not missed
            notified.as_mut().enable();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}
