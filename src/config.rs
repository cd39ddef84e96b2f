//! Runtime settings
//!
//! Defaults come from each component's config type; any `ROVER_*`
//! environment variable overrides the matching field.

use crate::actuation::{DriveSpeeds, RvrConfig, WorkerConfig};
use crate::command::ArbitrationPolicy;
use crate::connection::LinkConfig;
use anyhow::{anyhow, Context, Result};
use std::str::FromStr;
use std::time::Duration;

/// Which motor backend to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Sphero RVR over UART
    #[default]
    Rvr,
    /// Log-only backend for bench runs
    Simulated,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rvr" => Ok(BackendKind::Rvr),
            "sim" => Ok(BackendKind::Simulated),
            other => Err(anyhow!("Unknown backend: {} (expected rvr or sim)", other)),
        }
    }
}

/// Everything the process needs to start
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub link: LinkConfig,
    pub worker: WorkerConfig,
    pub policy: ArbitrationPolicy,
    pub backend: BackendKind,
    pub rvr: RvrConfig,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("ROVER_HUB_HOST") {
            settings.link.host = host;
        }
        if let Some(port) = get("ROVER_HUB_PORT") {
            settings.link.port = parse("ROVER_HUB_PORT", &port)?;
        }
        if let Some(route) = get("ROVER_HUB_ROUTE") {
            settings.link.route = route;
        }
        if let Some(ms) = get("ROVER_IDLE_TIMEOUT_MS") {
            settings.link.idle_timeout = millis("ROVER_IDLE_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = get("ROVER_CONNECT_TIMEOUT_MS") {
            settings.link.connect_timeout = millis("ROVER_CONNECT_TIMEOUT_MS", &ms)?;
        }

        if let Some(ms) = get("ROVER_TICK_MS") {
            settings.worker.tick_period = millis("ROVER_TICK_MS", &ms)?;
        }
        let DriveSpeeds { straight, turn } = settings.worker.speeds;
        settings.worker.speeds = DriveSpeeds {
            straight: match get("ROVER_FORWARD_SPEED") {
                Some(v) => parse("ROVER_FORWARD_SPEED", &v)?,
                None => straight,
            },
            turn: match get("ROVER_TURN_SPEED") {
                Some(v) => parse("ROVER_TURN_SPEED", &v)?,
                None => turn,
            },
        };

        if let Some(policy) = get("ROVER_POLICY") {
            settings.policy = policy.parse().context("ROVER_POLICY")?;
        }
        if let Some(backend) = get("ROVER_BACKEND") {
            settings.backend = backend.parse().context("ROVER_BACKEND")?;
        }
        if let Some(port) = get("ROVER_SERIAL_PORT") {
            settings.rvr.port = port;
        }
        if let Some(baud) = get("ROVER_SERIAL_BAUD") {
            settings.rvr.baud = parse("ROVER_SERIAL_BAUD", &baud)?;
        }

        Ok(settings)
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{}={:?} is not valid", key, value))
}

fn millis(key: &str, value: &str) -> Result<Duration> {
    let ms: u64 = parse(key, value)?;
    if ms == 0 {
        return Err(anyhow!("{} must be greater than zero", key));
    }
    Ok(Duration::from_millis(ms))
}
