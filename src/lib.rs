//! Boardlink gives an application one connection object to talk to a
//! microcontroller board, whatever the physical link to it: a USB serial
//! adapter, a WiFi serial bridge or a Bluetooth serial port.
//!
//! The [`Connection`] picks the link according to a [`TransportPolicy`],
//! trying USB first, then WiFi, then Bluetooth. Attached USB adapters are
//! matched by vendor and product id against a [registry](registry) of known
//! boards and adapter chips.
//!
//! Besides plain reads and writes, a connection can push a firmware image to
//! the board's bootloader in the background. The upload borrows the
//! connection's transport, saves and restores its line configuration around
//! the transfer, and reports its progress through an [`UploadCallback`].
//!
//! **Example** - Talking to whatever board is plugged in:
//! ```no_run
//! use boardlink::{ConfigBuilder, Connection, TransportPolicy};
//!
//! let connection = Connection::new(TransportPolicy::usb_only());
//! let config = ConfigBuilder::new().baud_rate(115_200).finalize();
//! connection.open_with(&config).expect("no board found");
//! connection.write(b"hello\n").unwrap();
//!
//! let mut buf = [0u8; 64];
//! let n = connection.read(&mut buf).unwrap();
//! println!("{} bytes from {}", n, connection.driver_name());
//! connection.close().unwrap();
//! ```
//!
//! **Example** - Uploading a firmware image:
//! ```no_run
//! use boardlink::{Connection, FirmwareSource, TransportPolicy, UploadCallback, ARDUINO_UNO};
//!
//! struct Progress;
//! impl UploadCallback for Progress {
//!     fn on_uploading(&mut self, progress: u32) {
//!         println!("{}%", progress);
//!     }
//! }
//!
//! let connection = Connection::new(TransportPolicy::usb_only());
//! connection.upload(
//!     ARDUINO_UNO,
//!     FirmwareSource::path("firmware.bin"),
//!     Some(Box::new(Progress)),
//! );
//! connection.wait_for_upload();
//! ```

mod connection;
mod environment;
mod error;
pub mod registry;
mod ring_buffer;
mod selector;
mod settings;
mod transport;
mod upload;

pub use connection::{Connection, NO_DRIVER, NO_PHYSICAL_CONNECTION};
pub use environment::{Environment, SystemEnvironment, UsbInterface};
pub use error::{Error, Result};
pub use registry::{DeviceDescriptor, DriverKind};
pub use ring_buffer::RingBuffer;
pub use selector::TransportSelector;
pub use settings::{
    BluetoothParams, ConfigBuilder, ConnectionConfig, DataBits, Parity, PolicyBuilder, StopBits,
    TransportPolicy, WifiParams, DEFAULT_DATA_PORT, DEFAULT_WIFI_HOST,
};
pub use transport::{
    PhysicalKind, ReadListener, ReadPump, SerialEndpoint, SerialTransport, SystemFactory,
    TcpTransport, Transport, TransportFactory, DEFAULT_BUFFER_CAPACITY,
};
pub use upload::{
    board_by_name, boards, BoardProfile, CancelToken, FirmwareSource, RawImageUploader,
    ResetMethod, UploadCallback, UploadError, UploadOutcome, UploadReporter, Uploader,
    ARDUINO_MEGA, ARDUINO_UNO, GENERIC, RASPBERRY_PI,
};
