//! The transport capability set and its implementations.
//!
//! A [`Transport`] is a byte channel to a board together with the controls of
//! its serial line. Whatever the physical link (a USB serial adapter, a WiFi
//! serial bridge or a Bluetooth serial profile), the rest of the crate only
//! talks to this trait.
//!
//! Received bytes are pumped by a background thread into a
//! [`RingBuffer`](crate::RingBuffer) owned by the transport; `read` drains that
//! buffer and never blocks.

mod factory;
mod pump;
mod serial;
mod tcp;

use std::{fmt, sync::Arc};

use crate::{
    error::Result,
    settings::{ConfigBuilder, ConnectionConfig, DataBits, Parity, StopBits},
};

pub use factory::{SystemFactory, TransportFactory};
pub use pump::{ReadPump, DEFAULT_BUFFER_CAPACITY};
pub use serial::{SerialEndpoint, SerialTransport};
pub use tcp::TcpTransport;

// =============================================================================
// Public Interface
// =============================================================================

/// Physical kind of the link behind a transport.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum PhysicalKind {
    Usb = 1,
    Wifi = 2,
    Bluetooth = 3,
}

impl PhysicalKind {
    /// Numeric code: USB = 1, WiFi = 2, Bluetooth = 3.
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            PhysicalKind::Usb => "USB",
            PhysicalKind::Wifi => "WiFi",
            PhysicalKind::Bluetooth => "BlueTooth",
        }
    }
}

impl fmt::Display for PhysicalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Called from the reader thread with the number of buffered bytes after new
/// data arrived.
pub type ReadListener = Arc<dyn Fn(usize) + Send + Sync>;

/// A byte channel to a board.
///
/// Reading and writing take `&self` so they can run concurrently with each
/// other; lifecycle and line configuration take `&mut self` and are therefore
/// exclusive.
pub trait Transport: Send + Sync {
    /// Open the link. Opening an open transport succeeds without effect.
    fn open(&mut self) -> Result<()>;

    /// Close the link. Closing a closed transport succeeds without effect.
    fn close(&mut self) -> Result<()>;

    /// Whether the link is up. Turns false on its own when the link is lost.
    fn is_open(&self) -> bool;

    /// Move buffered received bytes into `buf`. Never blocks; returns 0 when
    /// nothing is buffered or the transport is closed.
    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Write bytes and return how many were accepted. Returns 0 when the
    /// transport is closed.
    fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Apply a complete line configuration.
    fn set_config(&mut self, config: &ConnectionConfig) -> Result<()>;

    /// The line configuration currently in effect.
    fn config(&self) -> ConnectionConfig;

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        let config = ConfigBuilder::from_config(self.config())
            .baud_rate(baud_rate)
            .finalize();
        self.set_config(&config)
    }

    fn set_data_bits(&mut self, data_bits: DataBits) -> Result<()> {
        let config = ConfigBuilder::from_config(self.config())
            .data_bits(data_bits)
            .finalize();
        self.set_config(&config)
    }

    fn set_parity(&mut self, parity: Parity) -> Result<()> {
        let config = ConfigBuilder::from_config(self.config())
            .parity(parity)
            .finalize();
        self.set_config(&config)
    }

    fn set_stop_bits(&mut self, stop_bits: StopBits) -> Result<()> {
        let config = ConfigBuilder::from_config(self.config())
            .stop_bits(stop_bits)
            .finalize();
        self.set_config(&config)
    }

    fn set_dtr_rts(&mut self, dtr_on: bool, rts_on: bool) -> Result<()> {
        let config = ConfigBuilder::from_config(self.config())
            .dtr_rts(dtr_on, rts_on)
            .finalize();
        self.set_config(&config)
    }

    /// Set DTR according to the device's default policy, RTS unchanged.
    fn set_auto_dtr(&mut self) -> Result<()> {
        let rts_on = self.config().rts_on;
        let dtr_on = self.default_dtr();
        self.set_dtr_rts(dtr_on, rts_on)
    }

    /// Register the listener notified of incoming data, replacing any
    /// previous one.
    fn add_read_listener(&self, listener: ReadListener);

    fn clear_read_listener(&self);

    /// Suspend listener notifications. Incoming bytes are still buffered.
    fn stop_read_listener(&self);

    /// Resume listener notifications.
    fn start_read_listener(&self);

    /// Drop buffered bytes, both ours and the ones pending in the link.
    fn clear_buffer(&self) -> Result<()>;

    fn physical_kind(&self) -> PhysicalKind;

    /// Short name of the driver behind this transport, e.g. `"ftdi"`.
    fn driver_name(&self) -> &str;

    fn vendor_id(&self) -> u16 {
        0
    }

    fn product_id(&self) -> u16 {
        0
    }

    /// Default DTR state of the device, used by [`set_auto_dtr`](Self::set_auto_dtr).
    fn default_dtr(&self) -> bool {
        false
    }
}

impl fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transport")
            .field(&self.driver_name())
            .field(&self.physical_kind())
            .field(&self.is_open())
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn physical_kind_codes() {
    assert_eq!(PhysicalKind::Usb.code(), 1);
    assert_eq!(PhysicalKind::Wifi.code(), 2);
    assert_eq!(PhysicalKind::Bluetooth.code(), 3);
}

#[test]
fn physical_kind_names() {
    assert_eq!(PhysicalKind::Usb.to_string(), "USB");
    assert_eq!(PhysicalKind::Wifi.to_string(), "WiFi");
    assert_eq!(PhysicalKind::Bluetooth.to_string(), "BlueTooth");
}
