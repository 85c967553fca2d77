//! WildDevine Lightstone USB biosensor driver.
//!
//! This crate acquires skin conductance and photoplethysmograph time series
//! from a WildDevine capture device and emits them as a steady 50 Hz stream
//! of interleaved 32-bit floats.
//!
//! # Timing and synchronization
//!
//! The device samples on an internal uniform clock but does not timestamp
//! anything; the host sees only jittery USB arrival instants, quantized to
//! small multiples of a millisecond by the transfer scheduling. Timing is
//! reconstructed in two stages:
//!
//! 1. a software PLL ([`Pll`]) tracks phase and period of the device clock
//!    and assigns each sample a reconstructed instant;
//! 2. a truncated-sinc interpolator maps the reclocked, irregular samples
//!    onto the integer-rate output grid ([`WildDevine::fill`]).
//!
//! A collector thread owns the USB transport and feeds a shared queue; the
//! host pulls fixed-size frames from the other end. See [`WildDevine`] for
//! the lifecycle.

mod errors;
pub mod logging;
mod parser;
mod pll;
mod queue;
mod usb;
mod wilddevine;

pub use errors::{DriverError, FlowError, FlowStatus, Result};
pub use parser::{RawSample, RecordBuffer};
pub use pll::Pll;
pub use queue::{QueuedSample, SampleQueue};
pub use usb::{ReadOutcome, UsbTransport, PACKET_SIZE, PROD_ID, READ_TIMEOUT, VEND_ID};
pub use wilddevine::{
    CollectStats, DeviceListener, FrameMeta, WildDevine, BLOCKSIZE, KERNEL_LENGTH, RATE, UNIT_SIZE,
};
