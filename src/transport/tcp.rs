//! TCP transport for WiFi serial bridges.
//!
//! A bridge exposes the board's serial line on a data port. Line settings are
//! sent as text commands on a second, control port:
//!
//! ```text
//! <baud> <data bits> <parity N|O|E> <stop bits> <dtr 0|1> <rts 0|1>\n
//! ```
//!
//! The control connection is optional; without it settings only take effect
//! locally.

use std::{
    fmt,
    io::{self, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    sync::{Mutex, PoisonError},
    time::Duration,
};

use log::{debug, info, warn};

use super::{PhysicalKind, ReadListener, ReadPump, Transport, DEFAULT_BUFFER_CAPACITY};
use crate::{
    error::{Error, Result},
    settings::{ConnectionConfig, DataBits, Parity, StopBits, WifiParams},
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const READ_TIMEOUT: Duration = Duration::from_millis(100);

// =============================================================================
// Public Interface
// =============================================================================

/// A [`Transport`] to a WiFi serial bridge.
pub struct TcpTransport {
    params: WifiParams,
    config: ConnectionConfig,
    data: Option<TcpStream>,
    control: Option<TcpStream>,
    pump: Option<ReadPump>,
    listener: Mutex<Option<ReadListener>>,
    suspended: Mutex<bool>,
}

impl TcpTransport {
    pub fn new(params: WifiParams) -> Self {
        TcpTransport {
            params,
            config: ConnectionConfig::default(),
            data: None,
            control: None,
            pump: None,
            listener: Mutex::new(None),
            suspended: Mutex::new(false),
        }
    }

    pub fn params(&self) -> &WifiParams {
        &self.params
    }

    fn send_config(&mut self, config: &ConnectionConfig) -> Result<()> {
        if let Some(control) = self.control.as_mut() {
            let line = control_line(config);
            debug!("control: {}", line.trim_end());
            control.write_all(line.as_bytes())?;
            control.flush()?;
        }
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        // Release what is left of a lost link.
        self.close()?;

        let data = connect(&self.params.host, self.params.data_port)?;
        data.set_nodelay(true)?;
        let reader = data.try_clone()?;
        reader.set_read_timeout(Some(READ_TIMEOUT))?;

        self.control = match connect(&self.params.host, self.params.control_port) {
            Ok(control) => Some(control),
            Err(e) => {
                warn!(
                    "No control connection to {}:{} ({}), line settings stay local",
                    self.params.host, self.params.control_port, e
                );
                None
            }
        };

        let pump = ReadPump::spawn("wifi", reader, DEFAULT_BUFFER_CAPACITY)?;
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
            "Connected to {}:{}",
            self.params.host, self.params.data_port
        );
        self.data = Some(data);
        self.pump = Some(pump);

        let config = self.config;
        self.send_config(&config)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(data) = self.data.take() {
            // Unblocks the reader before joining it.
            let _ = data.shutdown(std::net::Shutdown::Both);
            info!("Disconnected from {}:{}", self.params.host, self.params.data_port);
        }
        if let Some(mut pump) = self.pump.take() {
            pump.stop();
        }
        self.control = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.data.is_some() && self.pump.as_ref().map_or(false, ReadPump::is_running)
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.pump.as_ref().map_or(0, |pump| pump.read(buf)))
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        match self.data.as_ref() {
            Some(mut stream) => match stream.write(buf) {
                Ok(n) => Ok(n),
                Err(ref e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    Ok(0)
                }
                Err(e) => Err(e.into()),
            },
            None => Ok(0),
        }
    }

    fn set_config(&mut self, config: &ConnectionConfig) -> Result<()> {
        self.send_config(config)?;
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
        if let Some(pump) = &self.pump {
            pump.clear();
        }
        Ok(())
    }

    fn physical_kind(&self) -> PhysicalKind {
        PhysicalKind::Wifi
    }

    fn driver_name(&self) -> &str {
        "wifi"
    }
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("params", &self.params)
            .field("config", &self.config)
            .field("open", &self.is_open())
            .finish()
    }
}

// =============================================================================
// Private stuff
// =============================================================================

fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("connect {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }
    Err(match last_error {
        Some(e) => e.into(),
        None => Error::PortNotFound(format!("{}:{}", host, port)),
    })
}

fn control_line(config: &ConnectionConfig) -> String {
    let data_bits = match config.data_bits {
        DataBits::Five => 5,
        DataBits::Six => 6,
        DataBits::Seven => 7,
        DataBits::Eight => 8,
    };
    let parity = match config.parity {
        Parity::None => 'N',
        Parity::Odd => 'O',
        Parity::Even => 'E',
    };
    let stop_bits = match config.stop_bits {
        StopBits::One => 1,
        StopBits::Two => 2,
    };
    format!(
        "{} {} {} {} {} {}\n",
        config.baud_rate,
        data_bits,
        parity,
        stop_bits,
        config.dtr_on as u8,
        config.rts_on as u8
    )
}

// =============================================================================
// Unit Tests
// =============================================================================
