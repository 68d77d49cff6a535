//! Construction of transports for the selector.

use log::debug;

use super::{SerialTransport, TcpTransport, Transport};
use crate::{
    environment::UsbInterface,
    registry::{DeviceDescriptor, DriverKind},
    settings::WifiParams,
};

/// Builds transport implementations for candidate interfaces.
pub trait TransportFactory: Send + Sync {
    /// Transport for an attached USB interface. `driver` is the resolved
    /// driver kind, never [`DriverKind::Unknown`].
    fn usb(
        &self,
        interface: &UsbInterface,
        driver: DriverKind,
        descriptor: &'static DeviceDescriptor,
    ) -> Box<dyn Transport>;

    fn wifi(&self, params: &WifiParams) -> Box<dyn Transport>;

    fn bluetooth(&self, device_name: Option<&str>) -> Box<dyn Transport>;
}

/// Factory of the built-in transports.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFactory;

type UsbConstructor = fn(&UsbInterface, &DeviceDescriptor) -> SerialTransport;

/// Constructor of the transport implementation for a driver kind.
fn usb_constructor(driver: DriverKind) -> UsbConstructor {
    match driver {
        DriverKind::Ftdi => ftdi,
        DriverKind::Cp210x => cp210x,
        DriverKind::WinCh34x => ch34x,
        DriverKind::CdcAcm | DriverKind::Unknown => cdc_acm,
    }
}

fn cdc_acm(interface: &UsbInterface, descriptor: &DeviceDescriptor) -> SerialTransport {
    serial(interface, descriptor, DriverKind::CdcAcm)
}

fn ftdi(interface: &UsbInterface, descriptor: &DeviceDescriptor) -> SerialTransport {
    serial(interface, descriptor, DriverKind::Ftdi)
}

fn cp210x(interface: &UsbInterface, descriptor: &DeviceDescriptor) -> SerialTransport {
    serial(interface, descriptor, DriverKind::Cp210x)
}

fn ch34x(interface: &UsbInterface, descriptor: &DeviceDescriptor) -> SerialTransport {
    serial(interface, descriptor, DriverKind::WinCh34x)
}

fn serial(
    interface: &UsbInterface,
    descriptor: &DeviceDescriptor,
    driver: DriverKind,
) -> SerialTransport {
    SerialTransport::usb(
        interface.port_name.clone(),
        interface.vendor_id,
        interface.product_id,
        driver,
        descriptor.default_dtr,
    )
}

impl TransportFactory for SystemFactory {
    fn usb(
        &self,
        interface: &UsbInterface,
        driver: DriverKind,
        descriptor: &'static DeviceDescriptor,
    ) -> Box<dyn Transport> {
        debug!("{}: {} transport", interface.port_name, driver.name());
        Box::new(usb_constructor(driver)(interface, descriptor))
    }

    fn wifi(&self, params: &WifiParams) -> Box<dyn Transport> {
        Box::new(TcpTransport::new(params.clone()))
    }

    fn bluetooth(&self, device_name: Option<&str>) -> Box<dyn Transport> {
        Box::new(SerialTransport::bluetooth(device_name))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{registry, transport::PhysicalKind};

    #[test]
    fn usb_dispatch_on_driver_kind() {
        let iface = UsbInterface::new("/dev/ttyUSB0", 0x10C4, 0xEA60);
        let descriptor = registry::lookup(iface.vendor_id, iface.product_id);
        let transport = SystemFactory.usb(&iface, descriptor.driver, descriptor);
        assert_eq!(transport.driver_name(), "cp210x");
        assert_eq!(transport.physical_kind(), PhysicalKind::Usb);
        assert_eq!(transport.vendor_id(), 0x10C4);
    }

    #[test]
    fn unknown_driver_builds_cdc_acm() {
        let iface = UsbInterface::new("/dev/ttyACM3", 0xDEAD, 0xBEEF);
        let transport = SystemFactory.usb(&iface, DriverKind::Unknown, &registry::UNKNOWN);
        assert_eq!(transport.driver_name(), "cdc-acm");
    }

    #[test]
    fn auto_dtr_comes_from_descriptor() {
        let iface = UsbInterface::new("/dev/ttyACM0", 0x2341, 0x8036);
        let descriptor = registry::lookup(iface.vendor_id, iface.product_id);
        let transport = SystemFactory.usb(&iface, descriptor.driver, descriptor);
        assert!(transport.default_dtr());
    }

    #[test]
    fn wifi_and_bluetooth_kinds() {
        assert_eq!(
            SystemFactory.wifi(&WifiParams::default()).physical_kind(),
            PhysicalKind::Wifi
        );
        assert_eq!(
            SystemFactory.bluetooth(None).physical_kind(),
            PhysicalKind::Bluetooth
        );
    }
}
