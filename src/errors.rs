//! Error types surfaced by the WildDevine driver, split between device setup and streaming concerns.
use std::io;

use thiserror::Error;

/// Setup and lifecycle errors surfaced to callers of `start`/`stop`.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("io error: {0}")]
    /// I/O failures from stdlib operations (thread spawn).
    Io(#[from] io::Error),
    #[error("usb error: {0}")]
    /// Transport-layer errors while enumerating or opening the device.
    Usb(#[from] rusb::Error),
    #[error("device {vendor:04x}:{product:04x} not found")]
    /// No device with the sensor's vendor/product id is on the bus.
    NotFound { vendor: u16, product: u16 },
    #[error("claiming interface failed: {0}")]
    /// The control interface could not be claimed.
    Claim(rusb::Error),
    #[error("acquisition already running")]
    /// `start` was called while a collector thread is alive.
    AlreadyStarted,
    #[error("acquisition not running")]
    /// `stop` was called with no collector thread to join.
    NotStarted,
    #[error("collector thread panicked")]
    /// The collector thread died abnormally; the device state is unknown.
    CollectorPanicked,
}

/// Terminal status of the sample stream, written once by the collector thread.
///
/// `Eos` covers the orderly endings (device unplugged, transfer halted, stop
/// requested); `Error` covers transport faults, after which the output would
/// have a hole and is therefore meaningless for a realtime sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    /// Samples are flowing.
    Ok,
    /// The stream ended normally.
    Eos,
    /// The stream died on a transport or timing fault.
    Error,
}

/// How `fill` reports a stopped stream to the host; mirrors the non-`Ok`
/// [`FlowStatus`] values unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("end of stream")]
    Eos,
    #[error("stream error")]
    Error,
}

/// Convenience result alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;
