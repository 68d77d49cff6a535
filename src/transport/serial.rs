//! Serial port transport, used for USB serial adapters and Bluetooth serial
//! links.

use std::{
    fmt,
    io::{self, Write},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use log::{debug, info};
use serialport::{available_ports, ClearBuffer, SerialPort, SerialPortType};

use super::{PhysicalKind, ReadListener, ReadPump, Transport, DEFAULT_BUFFER_CAPACITY};
use crate::{
    error::{Error, Result},
    registry::DriverKind,
    settings::ConnectionConfig,
};

/// Read timeout of the port; bounds how long closing waits for the reader.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

// =============================================================================
// Public Interface
// =============================================================================

/// Where the serial port of a transport comes from.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SerialEndpoint {
    /// A USB serial adapter enumerated under a known port name.
    Usb {
        port_name: String,
        vendor_id: u16,
        product_id: u16,
    },
    /// A Bluetooth serial port, resolved when the transport is opened.
    Bluetooth { device_name: Option<String> },
}

impl SerialEndpoint {
    /// Find the name of the port to open.
    fn resolve(&self) -> Result<String> {
        match self {
            SerialEndpoint::Usb { port_name, .. } => Ok(port_name.clone()),
            SerialEndpoint::Bluetooth { device_name } => {
                let ports = available_ports()?;
                ports
                    .into_iter()
                    .filter(|p| matches!(p.port_type, SerialPortType::BluetoothPort))
                    .map(|p| p.port_name)
                    .find(|name| device_name.as_ref().map_or(true, |d| name.contains(d.as_str())))
                    .ok_or_else(|| {
                        Error::PortNotFound(
                            device_name
                                .clone()
                                .unwrap_or_else(|| "bluetooth serial port".into()),
                        )
                    })
            }
        }
    }
}

/// A [`Transport`] over an operating system serial port.
///
/// The chip specific programming of USB serial adapters is done by the
/// operating system driver; the [`DriverKind`] only names the adapter family
/// and carries its line defaults.
pub struct SerialTransport {
    endpoint: SerialEndpoint,
    driver: &'static str,
    default_dtr: bool,
    config: ConnectionConfig,
    port: Mutex<Option<Box<dyn SerialPort>>>,
    pump: Option<ReadPump>,
    listener: Mutex<Option<ReadListener>>,
    suspended: Mutex<bool>,
}

impl SerialTransport {
    /// Transport for a USB serial adapter of the given driver family.
    pub fn usb(
        port_name: impl Into<String>,
        vendor_id: u16,
        product_id: u16,
        driver: DriverKind,
        default_dtr: bool,
    ) -> Self {
        Self::new(
            SerialEndpoint::Usb {
                port_name: port_name.into(),
                vendor_id,
                product_id,
            },
            driver.name(),
            default_dtr,
        )
    }

    /// Transport for a Bluetooth serial port, optionally matching a device
    /// name.
    pub fn bluetooth(device_name: Option<&str>) -> Self {
        Self::new(
            SerialEndpoint::Bluetooth {
                device_name: device_name.map(str::to_owned),
            },
            "bluetooth-spp",
            false,
        )
    }

    fn new(endpoint: SerialEndpoint, driver: &'static str, default_dtr: bool) -> Self {
        SerialTransport {
            endpoint,
            driver,
            default_dtr,
            config: ConnectionConfig::default(),
            port: Mutex::new(None),
            pump: None,
            listener: Mutex::new(None),
            suspended: Mutex::new(false),
        }
    }

    pub fn endpoint(&self) -> &SerialEndpoint {
        &self.endpoint
    }

    fn port(&self) -> MutexGuard<'_, Option<Box<dyn SerialPort>>> {
        self.port.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        // Release what is left of a lost link.
        self.close()?;

        let path = self.endpoint.resolve()?;
        debug!("Opening {} with {:?}", path, self.config);
        let mut port = serialport::new(&path, self.config.baud_rate)
            .data_bits(self.config.data_bits)
            .stop_bits(self.config.stop_bits)
            .parity(self.config.parity)
            .timeout(READ_TIMEOUT)
            .open()?;
        port.write_data_terminal_ready(self.config.dtr_on)?;
        port.write_request_to_send(self.config.rts_on)?;

        let pump = ReadPump::spawn(self.driver, port.try_clone()?, DEFAULT_BUFFER_CAPACITY)?;
        pump.set_listener(
            self.listener
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        );
        if *self.suspended.lock().unwrap_or_else(PoisonError::into_inner) {
            pump.suspend();
        }

        info!(
            "Connected to {} ({}) at {} baud",
            path, self.driver, self.config.baud_rate
        );
        *self.port() = Some(port);
        self.pump = Some(pump);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut pump) = self.pump.take() {
            pump.stop();
        }
        if self.port().take().is_some() {
            info!("Disconnected {:?}", self.endpoint);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.pump.as_ref().map_or(false, ReadPump::is_running)
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.pump.as_ref().map_or(0, |pump| pump.read(buf)))
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        match self.port().as_mut() {
            Some(port) => match port.write(buf) {
                Ok(n) => Ok(n),
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
                Err(e) => Err(e.into()),
            },
            None => Ok(0),
        }
    }

    fn set_config(&mut self, config: &ConnectionConfig) -> Result<()> {
        if let Some(port) = self.port().as_mut() {
            port.set_baud_rate(config.baud_rate)?;
            port.set_data_bits(config.data_bits)?;
            port.set_stop_bits(config.stop_bits)?;
            port.set_parity(config.parity)?;
            port.write_data_terminal_ready(config.dtr_on)?;
            port.write_request_to_send(config.rts_on)?;
            debug!("Line configuration applied: {:?}", config);
        }
        self.config = *config;
        Ok(())
    }

    fn config(&self) -> ConnectionConfig {
        self.config
    }

    fn add_read_listener(&self, listener: ReadListener) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener.clone());
        if let Some(pump) = &self.pump {
            pump.set_listener(Some(listener));
        }
    }

    fn clear_read_listener(&self) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = None;
        if let Some(pump) = &self.pump {
            pump.set_listener(None);
        }
    }

    fn stop_read_listener(&self) {
        *self.suspended.lock().unwrap_or_else(PoisonError::into_inner) = true;
        if let Some(pump) = &self.pump {
            pump.suspend();
        }
    }

    fn start_read_listener(&self) {
        *self.suspended.lock().unwrap_or_else(PoisonError::into_inner) = false;
        if let Some(pump) = &self.pump {
            pump.resume();
        }
    }

    fn clear_buffer(&self) -> Result<()> {
        if let Some(port) = self.port().as_ref() {
            port.clear(ClearBuffer::All)?;
        }
        if let Some(pump) = &self.pump {
            pump.clear();
        }
        Ok(())
    }

    fn physical_kind(&self) -> PhysicalKind {
        match self.endpoint {
            SerialEndpoint::Usb { .. } => PhysicalKind::Usb,
            SerialEndpoint::Bluetooth { .. } => PhysicalKind::Bluetooth,
        }
    }

    fn driver_name(&self) -> &str {
        self.driver
    }

    fn vendor_id(&self) -> u16 {
        match self.endpoint {
            SerialEndpoint::Usb { vendor_id, .. } => vendor_id,
            SerialEndpoint::Bluetooth { .. } => 0,
        }
    }

    fn product_id(&self) -> u16 {
        match self.endpoint {
            SerialEndpoint::Usb { product_id, .. } => product_id,
            SerialEndpoint::Bluetooth { .. } => 0,
        }
    }

    fn default_dtr(&self) -> bool {
        self.default_dtr
    }
}

impl fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialTransport")
            .field("endpoint", &self.endpoint)
            .field("driver", &self.driver)
            .field("config", &self.config)
            .field("open", &self.is_open())
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ConfigBuilder;

    #[test]
    fn usb_identity() {
        let transport =
            SerialTransport::usb("/dev/ttyUSB0", 0x0403, 0x6001, DriverKind::Ftdi, false);
        assert_eq!(transport.driver_name(), "ftdi");
        assert_eq!(transport.physical_kind(), PhysicalKind::Usb);
        assert_eq!(transport.vendor_id(), 0x0403);
        assert_eq!(transport.product_id(), 0x6001);
        assert!(!transport.is_open());
    }

    #[test]
    fn bluetooth_identity() {
        let transport = SerialTransport::bluetooth(Some("HC-05"));
        assert_eq!(transport.driver_name(), "bluetooth-spp");
        assert_eq!(transport.physical_kind(), PhysicalKind::Bluetooth);
        assert_eq!(transport.vendor_id(), 0);
    }

    #[test]
    fn closed_transport_reads_and_writes_nothing() {
        let transport = SerialTransport::usb("/dev/null-port", 0, 0, DriverKind::CdcAcm, false);
        let mut buf = [0u8; 8];
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
        assert_eq!(transport.write(b"abc").unwrap(), 0);
    }

    #[test]
    fn config_is_kept_while_closed() {
        let mut transport =
            SerialTransport::usb("/dev/ttyACM0", 0x2341, 0x0043, DriverKind::CdcAcm, false);
        let config = ConfigBuilder::new().baud_rate(115_200).finalize();
        transport.set_config(&config).unwrap();
        assert_eq!(transport.config(), config);

        transport.set_baud_rate(57_600).unwrap();
        assert_eq!(transport.config().baud_rate, 57_600);
    }

    #[test]
    fn auto_dtr_follows_device_default() {
        let mut transport =
            SerialTransport::usb("/dev/ttyACM0", 0x2341, 0x8036, DriverKind::CdcAcm, true);
        transport.set_auto_dtr().unwrap();
        assert!(transport.config().dtr_on);
        assert!(!transport.config().rts_on);
    }

    #[test]
    fn open_missing_port_fails() {
        let mut transport =
            SerialTransport::usb("/dev/this-port-does-not-exist", 0, 0, DriverKind::CdcAcm, false);
        assert!(transport.open().is_err());
        assert!(!transport.is_open());
    }
}
