//! What the transport selection needs to know about the host system.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use log::{debug, info};
use serialport::{available_ports, SerialPortType};

// =============================================================================
// Public Interface
// =============================================================================

/// A USB serial interface currently attached to the host.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UsbInterface {
    /// The port name, usually the device path.
    pub port_name: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl UsbInterface {
    pub fn new(port_name: impl Into<String>, vendor_id: u16, product_id: u16) -> Self {
        UsbInterface {
            port_name: port_name.into(),
            vendor_id,
            product_id,
            manufacturer: None,
            product: None,
        }
    }
}

/// Host services consumed by the [`TransportSelector`](crate::TransportSelector).
pub trait Environment: Send + Sync {
    /// USB serial interfaces currently attached, in enumeration order.
    fn usb_interfaces(&self) -> Vec<UsbInterface>;

    /// Whether `host` can be reached over the network at all.
    fn network_reachable(&self, host: &str, port: u16) -> bool;
}

/// The [`Environment`] of the running host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn usb_interfaces(&self) -> Vec<UsbInterface> {
        let mut interfaces = vec![];
        match available_ports() {
            Ok(ports) => {
                for p in ports {
                    if let SerialPortType::UsbPort(info) = p.port_type {
                        debug!(
                            "{}: {:04x}:{:04x} ({} / {})",
                            p.port_name,
                            info.vid,
                            info.pid,
                            info.manufacturer.as_ref().map_or("", String::as_str),
                            info.product.as_ref().map_or("", String::as_str)
                        );
                        interfaces.push(UsbInterface {
                            port_name: p.port_name,
                            vendor_id: info.vid,
                            product_id: info.pid,
                            manufacturer: info.manufacturer,
                            product: info.product,
                        });
                    }
                }
            }
            Err(ref e) => {
                info!("error: {}", e.to_string());
            }
        }
        interfaces
    }

    /// A host is reachable when its name resolves and the system has a route
    /// to it. No packet is sent.
    fn network_reachable(&self, host: &str, port: u16) -> bool {
        let addrs = match (host, port).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!("cannot resolve {}: {}", host, e);
                return false;
            }
        };
        addrs.into_iter().any(|addr| {
            let local: SocketAddr = match addr {
                SocketAddr::V4(_) => ([0u8; 4], 0).into(),
                SocketAddr::V6(_) => ([0u16; 8], 0).into(),
            };
            UdpSocket::bind(local)
                .and_then(|socket| socket.connect(addr))
                .is_ok()
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
