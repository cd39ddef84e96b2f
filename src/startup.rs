//! Startup sequence: hub link up, motors awake, settle
//!
//! Every way out of here other than success leaves the motors stopped and
//! the backend released.

use crate::actuation::{BackendError, MotorBackend};
use crate::connection::{HubSocket, LinkError, LinkManager};
use crate::safety::{ShutdownFlag, ShutdownReason};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Why startup did not reach the drive loop
#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("Failed to wake motors: {0}")]
    Wake(#[source] BackendError),

    #[error("Interrupted during startup")]
    Interrupted,
}

/// Connect to the hub and wake the backend.
///
/// The connect and the settle delay both give way to the shutdown flag. On
/// any error the backend is stopped and released before returning; fatal
/// errors also set the flag.
pub async fn bring_up<B: MotorBackend + ?Sized>(
    link: &mut LinkManager,
    backend: &mut B,
    shutdown: &ShutdownFlag,
    wake_settle: Duration,
) -> Result<HubSocket, StartupError> {
    let result = start(link, backend, shutdown, wake_settle).await;

    if let Err(e) = &result {
        match e {
            StartupError::Interrupted => info!("[STARTUP] {}", e),
            _ => {
                error!("[STARTUP] {}", e);
                shutdown.trigger(ShutdownReason::Fatal {
                    reason: e.to_string(),
                });
            }
        }
        release(backend);
    }
    result
}

async fn start<B: MotorBackend + ?Sized>(
    link: &mut LinkManager,
    backend: &mut B,
    shutdown: &ShutdownFlag,
    wake_settle: Duration,
) -> Result<HubSocket, StartupError> {
    let socket = tokio::select! {
        biased;
        _ = shutdown.wait() => return Err(StartupError::Interrupted),
        result = link.connect() => result?,
    };

    backend.wake().map_err(StartupError::Wake)?;

    if !wake_settle.is_zero() {
        info!("[STARTUP] Waiting {:?} for motors to settle", wake_settle);
        tokio::select! {
            biased;
            _ = shutdown.wait() => return Err(StartupError::Interrupted),
            _ = tokio::time::sleep(wake_settle) => {}
        }
    }

    Ok(socket)
}

/// Stop and release the backend. Returns whether the stop went through.
pub fn release<B: MotorBackend + ?Sized>(backend: &mut B) -> bool {
    let stopped = match backend.stop() {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to stop motors: {}", e);
            false
        }
    };
    if let Err(e) = backend.close() {
        warn!("Failed to release backend: {}", e);
    }
    stopped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuation::testing::{Call, RecordingBackend};
    use crate::command::CommandArbitrator;
    use crate::connection::LinkConfig;
    use futures::StreamExt;
    use rover_shared::state_machine::LinkState;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    fn link_to(port: u16, shutdown: Arc<ShutdownFlag>) -> LinkManager {
        LinkManager::new(
            LinkConfig {
                host: "127.0.0.1".into(),
                port,
                ..Default::default()
            },
            Arc::new(CommandArbitrator::default()),
            shutdown,
        )
    }

    /// Port with nothing listening on it
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    /// Hub that accepts one client and reads until it goes away
    async fn listening_hub() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });
        port
    }

    #[tokio::test]
    async fn test_ready_after_connect_and_wake() {
        let shutdown = Arc::new(ShutdownFlag::new());
        let mut link = link_to(listening_hub().await, shutdown.clone());
        let mut backend = RecordingBackend::new();

        let socket = bring_up(&mut link, &mut backend, &shutdown, Duration::ZERO).await;
        assert!(socket.is_ok());
        assert_eq!(link.state(), LinkState::Connected);
        assert_eq!(backend.calls(), vec![Call::Wake]);
        assert!(!shutdown.is_set());
    }

    #[tokio::test]
    async fn test_connect_failure_stops_and_releases() {
        let shutdown = Arc::new(ShutdownFlag::new());
        let mut link = link_to(closed_port().await, shutdown.clone());
        let mut backend = RecordingBackend::new();

        let err = bring_up(&mut link, &mut backend, &shutdown, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, StartupError::Link(LinkError::Connect { .. })));
        assert_eq!(backend.calls(), vec![Call::Stop, Call::Close]);
        assert!(matches!(shutdown.reason(), Some(ShutdownReason::Fatal { .. })));
    }

    #[tokio::test]
    async fn test_wake_failure_stops_and_releases() {
        let shutdown = Arc::new(ShutdownFlag::new());
        let mut link = link_to(listening_hub().await, shutdown.clone());
        let mut backend = RecordingBackend::new();
        backend.set_failing(true);

        let err = bring_up(&mut link, &mut backend, &shutdown, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, StartupError::Wake(_)));
        // Stop is still attempted even though the bus is faulting
        assert_eq!(backend.calls(), vec![Call::Wake, Call::Stop, Call::Close]);
        assert!(matches!(shutdown.reason(), Some(ShutdownReason::Fatal { .. })));
    }

    #[tokio::test]
    async fn test_interrupt_before_connect_releases() {
        let shutdown = Arc::new(ShutdownFlag::new());
        shutdown.trigger(ShutdownReason::Interrupted);
        let mut link = link_to(closed_port().await, shutdown.clone());
        let mut backend = RecordingBackend::new();

        let err = bring_up(&mut link, &mut backend, &shutdown, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, StartupError::Interrupted));
        assert_eq!(backend.calls(), vec![Call::Stop, Call::Close]);
        assert_eq!(shutdown.reason(), Some(&ShutdownReason::Interrupted));
    }

    #[tokio::test]
    async fn test_interrupt_during_settle_releases() {
        let shutdown = Arc::new(ShutdownFlag::new());
        let mut link = link_to(listening_hub().await, shutdown.clone());
        let backend = RecordingBackend::new();

        let mut owned = backend.clone();
        let flag = shutdown.clone();
        let handle = tokio::spawn(async move {
            bring_up(&mut link, &mut owned, &flag, Duration::from_secs(60)).await
        });

        // Wait until the motors are awake and the settle delay has begun
        while backend.calls().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.trigger(ShutdownReason::Interrupted);

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(StartupError::Interrupted)));
        assert_eq!(backend.calls(), vec![Call::Wake, Call::Stop, Call::Close]);
    }

    #[test]
    fn test_release_reports_failed_stop() {
        let mut backend = RecordingBackend::new();
        assert!(release(&mut backend));

        let mut failing = RecordingBackend::new();
        failing.set_failing(true);
        assert!(!release(&mut failing));
        assert_eq!(failing.calls(), vec![Call::Stop, Call::Close]);
    }
}
