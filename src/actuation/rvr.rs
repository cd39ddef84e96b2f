//! Sphero RVR backend over UART
//!
//! Frames use the Sphero API v2 packet layout:
//! ```text
//! [ SOP ][ flags | tid | sid | did | cid | seq | data... | chk ]( escaped )[ EOP ]
//! ```
//! `chk` is the one's complement of the byte sum of everything between the
//! delimiters. SOP, EOP and ESC inside the body are escaped as
//! `ESC, byte & !ESC_MASK`.

use super::backend::{BackendError, MotorBackend};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info};

const SOP: u8 = 0x8D;
const EOP: u8 = 0xD8;
const ESC: u8 = 0xAB;
const ESC_MASK: u8 = 0x88;

const FLAG_IS_ACTIVITY: u8 = 0x08;
const FLAG_HAS_TARGET: u8 = 0x10;
const FLAG_HAS_SOURCE: u8 = 0x20;

/// Our node id on the RVR bus
const SOURCE_ID: u8 = 0x01;
/// Nordic processor (power management)
const TARGET_NORDIC: u8 = 0x11;
/// ST processor (motors)
const TARGET_ST: u8 = 0x12;

const DEVICE_POWER: u8 = 0x13;
const CMD_SLEEP: u8 = 0x01;
const CMD_WAKE: u8 = 0x0D;

const DEVICE_DRIVE: u8 = 0x16;
const CMD_RAW_MOTORS: u8 = 0x01;

/// Per-side motor mode for the raw motors command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RawMotorMode {
    Off = 0,
    Forward = 1,
    Reverse = 2,
}

/// Configuration for the RVR serial link
#[derive(Debug, Clone)]
pub struct RvrConfig {
    /// Serial device (e.g. "/dev/ttyS0" on a Raspberry Pi)
    pub port: String,
    /// Baud rate (RVR UART runs at 115200)
    pub baud: u32,
    /// Write timeout
    pub write_timeout: Duration,
    /// Time the RVR needs after wake before it accepts drive commands
    pub wake_settle: Duration,
}

impl Default for RvrConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyS0".into(),
            baud: 115_200,
            write_timeout: Duration::from_millis(200),
            wake_settle: Duration::from_secs(2),
        }
    }
}

/// Build one escaped, delimited packet
fn encode_packet(target: u8, device: u8, command: u8, seq: u8, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(7 + data.len());
    body.extend_from_slice(&[
        FLAG_IS_ACTIVITY | FLAG_HAS_TARGET | FLAG_HAS_SOURCE,
        target,
        SOURCE_ID,
        device,
        command,
        seq,
    ]);
    body.extend_from_slice(data);

    let sum = body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    body.push(!sum);

    let mut packet = Vec::with_capacity(body.len() * 2 + 2);
    packet.push(SOP);
    for byte in body {
        match byte {
            SOP | EOP | ESC => {
                packet.push(ESC);
                packet.push(byte & !ESC_MASK);
            }
            _ => packet.push(byte),
        }
    }
    packet.push(EOP);
    packet
}

/// Drives a Sphero RVR through its raw motors command
pub struct RvrBackend<W: Write + Send> {
    port: Option<W>,
    seq: u8,
}

impl RvrBackend<Box<dyn tokio_serial::SerialPort>> {
    /// Open the serial port. Failure here is fatal for the process.
    pub fn open(config: &RvrConfig) -> Result<Self, BackendError> {
        let port = tokio_serial::new(&config.port, config.baud)
            .timeout(config.write_timeout)
            .open()
            .map_err(|e| BackendError::Init(format!("{}: {}", config.port, e)))?;

        info!("[RVR] Serial port open: {} @ {}", config.port, config.baud);
        Ok(Self::new(port))
    }
}

impl<W: Write + Send> RvrBackend<W> {
    /// Wrap an already-open byte sink
    pub fn new(port: W) -> Self {
        Self {
            port: Some(port),
            seq: 0,
        }
    }

    /// Set both tracks directly
    pub fn raw_motors(
        &mut self,
        left_mode: RawMotorMode,
        left_speed: u8,
        right_mode: RawMotorMode,
        right_speed: u8,
    ) -> Result<(), BackendError> {
        self.send(
            TARGET_ST,
            DEVICE_DRIVE,
            CMD_RAW_MOTORS,
            &[left_mode as u8, left_speed, right_mode as u8, right_speed],
        )
    }

    fn send(&mut self, target: u8, device: u8, command: u8, data: &[u8]) -> Result<(), BackendError> {
        let port = self.port.as_mut().ok_or(BackendError::Closed)?;

        let packet = encode_packet(target, device, command, self.seq, data);
        self.seq = self.seq.wrapping_add(1);

        port.write_all(&packet)?;
        port.flush()?;
        debug!("[RVR] Sent did={:#04x} cid={:#04x} {:02x?}", device, command, data);
        Ok(())
    }

    #[cfg(test)]
    fn port(&self) -> Option<&W> {
        self.port.as_ref()
    }
}

impl<W: Write + Send> MotorBackend for RvrBackend<W> {
    fn name(&self) -> &'static str {
        "Sphero RVR"
    }

    fn forward(&mut self, speed: u8) -> Result<(), BackendError> {
        self.raw_motors(RawMotorMode::Forward, speed, RawMotorMode::Forward, speed)
    }

    fn backward(&mut self, speed: u8) -> Result<(), BackendError> {
        self.raw_motors(RawMotorMode::Reverse, speed, RawMotorMode::Reverse, speed)
    }

    fn left(&mut self, speed: u8) -> Result<(), BackendError> {
        self.raw_motors(RawMotorMode::Reverse, speed, RawMotorMode::Forward, speed)
    }

    fn right(&mut self, speed: u8) -> Result<(), BackendError> {
        self.raw_motors(RawMotorMode::Forward, speed, RawMotorMode::Reverse, speed)
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        self.raw_motors(RawMotorMode::Off, 0, RawMotorMode::Off, 0)
    }

    fn wake(&mut self) -> Result<(), BackendError> {
        info!("[RVR] Waking");
        self.send(TARGET_NORDIC, DEVICE_POWER, CMD_WAKE, &[])
    }

    fn close(&mut self) -> Result<(), BackendError> {
        if self.port.is_none() {
            return Ok(());
        }
        info!("[RVR] Putting RVR to sleep");
        let result = self.send(TARGET_NORDIC, DEVICE_POWER, CMD_SLEEP, &[]);
        self.port = None;
        result
    }
}
