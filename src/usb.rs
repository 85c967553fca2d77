//! USB transport for the WildDevine Lightstone sensor.
//!
//! The sensor is a low-speed HID-class device with a single interrupt IN
//! endpoint. Every transfer is exactly 8 bytes: byte 0 carries the count of
//! useful payload bytes (0-7), bytes 1.. carry that many ASCII characters of
//! the textual record stream parsed by [`crate::parser`].

use std::time::Duration;

use log::{debug, warn};
use rusb::{DeviceHandle, GlobalContext};

use crate::errors::{DriverError, Result};

/// USB vendor id of the sensor.
pub const VEND_ID: u16 = 0x14fa;
/// USB product id of the sensor.
pub const PROD_ID: u16 = 0x0001;
/// Interface holding the interrupt endpoint.
const INTERFACE: u8 = 0;
/// Interrupt IN endpoint address.
const ENDPOINT: u8 = 0x81;
/// Every transfer from the device is exactly this many bytes.
pub const PACKET_SIZE: usize = 8;

/// Interrupt read timeout. The device emits packets continuously (empty ones
/// when idle), so silence longer than this is a contract violation.
pub const READ_TIMEOUT: Duration = Duration::from_millis(80);

/// Outcome of one interrupt read, as acted on by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A full 8-byte packet arrived.
    Packet,
    /// The transfer completed with fewer than [`PACKET_SIZE`] bytes.
    Short(usize),
    /// No packet arrived within [`READ_TIMEOUT`].
    Timeout,
    /// The endpoint halted.
    Halted,
    /// The device sent more data than fits in one packet.
    Overflow,
    /// The device was unplugged.
    Unplugged,
    /// Any other transport failure.
    Unknown,
}

/// Source of 8-byte sensor packets. Lets tests substitute a scripted sequence
/// for real hardware; [`UsbTransport`] is the only production implementation.
pub(crate) trait PacketSource: Send {
    fn read_packet(&mut self, buf: &mut [u8; PACKET_SIZE]) -> ReadOutcome;
}

/// An open handle to the sensor with its interface claimed for the duration
/// of an acquisition.
pub struct UsbTransport {
    handle: DeviceHandle<GlobalContext>,
    claimed: bool,
}

impl UsbTransport {
    /// Scan the bus for the sensor and open it.
    pub fn open() -> Result<Self> {
        for device in rusb::devices()?.iter() {
            let desc = device.device_descriptor()?;
            if desc.vendor_id() == VEND_ID && desc.product_id() == PROD_ID {
                debug!(
                    "found sensor at bus {:03} address {:03}",
                    device.bus_number(),
                    device.address()
                );
                let handle = device.open()?;
                return Ok(Self {
                    handle,
                    claimed: false,
                });
            }
        }
        Err(DriverError::NotFound {
            vendor: VEND_ID,
            product: PROD_ID,
        })
    }

    /// Detach any kernel driver bound to the HID interface and claim it.
    pub fn claim(&mut self) -> Result<()> {
        // usbhid usually grabs the device at enumeration; failure to detach
        // is fine when nothing was bound.
        let _ = self.handle.detach_kernel_driver(INTERFACE);
        self.handle
            .claim_interface(INTERFACE)
            .map_err(DriverError::Claim)?;
        self.claimed = true;
        Ok(())
    }

    /// Release the claimed interface. Safe to call more than once; also runs
    /// on drop so the interface is never leaked across an early exit.
    pub fn release(&mut self) {
        if self.claimed {
            if let Err(e) = self.handle.release_interface(INTERFACE) {
                warn!("releasing interface failed: {e}");
            }
            self.claimed = false;
        }
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        self.release();
    }
}

impl PacketSource for UsbTransport {
    fn read_packet(&mut self, buf: &mut [u8; PACKET_SIZE]) -> ReadOutcome {
        match self.handle.read_interrupt(ENDPOINT, buf, READ_TIMEOUT) {
            Ok(n) if n == PACKET_SIZE => ReadOutcome::Packet,
            Ok(n) => ReadOutcome::Short(n),
            Err(e) => map_transfer_error(e),
        }
    }
}

fn map_transfer_error(e: rusb::Error) -> ReadOutcome {
    match e {
        rusb::Error::Timeout => ReadOutcome::Timeout,
        rusb::Error::Pipe => ReadOutcome::Halted,
        rusb::Error::Overflow => ReadOutcome::Overflow,
        rusb::Error::NoDevice => ReadOutcome::Unplugged,
        other => {
            warn!("interrupt read failed: {other}");
            ReadOutcome::Unknown
        }
    }
}
