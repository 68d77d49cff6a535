//! Registry of known USB serial devices.
//!
//! Maps a (vendor id, product id) pair to the driver kind used to talk to the
//! device and to its default DTR policy. An entry with a zero product id is the
//! fallback for every other product of its vendor.

// =============================================================================
// Public Interface
// =============================================================================

/// Family of USB-to-serial interface found on a board.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DriverKind {
    Unknown,
    CdcAcm,
    Ftdi,
    Cp210x,
    WinCh34x,
}

impl DriverKind {
    pub fn name(self) -> &'static str {
        match self {
            DriverKind::Unknown => "unknown",
            DriverKind::CdcAcm => "cdc-acm",
            DriverKind::Ftdi => "ftdi",
            DriverKind::Cp210x => "cp210x",
            DriverKind::WinCh34x => "ch34x",
        }
    }

    /// CDC-ACM is the most common interface, use it for unknown devices.
    pub fn or_default(self) -> DriverKind {
        match self {
            DriverKind::Unknown => DriverKind::CdcAcm,
            kind => kind,
        }
    }
}

/// Static description of a known USB serial device.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    /// Zero means any product of the vendor.
    pub product_id: u16,
    pub driver: DriverKind,
    /// Whether DTR should be asserted when the line is set up automatically.
    pub default_dtr: bool,
}

/// Descriptor returned for devices missing from the registry.
pub static UNKNOWN: DeviceDescriptor = device(0, 0, DriverKind::Unknown, false);

const ARDUINO: u16 = 0x2341;
const ARDUINO_ORG: u16 = 0x2A03;
const FTDI: u16 = 0x0403;
const SILABS: u16 = 0x10C4;
const QINHENG: u16 = 0x1A86;
const WCH: u16 = 0x4348;
const SPARKFUN: u16 = 0x1B4F;
const ADAFRUIT: u16 = 0x239A;
const RASPBERRY_PI: u16 = 0x2E8A;
const SEEED: u16 = 0x2886;
const MBED: u16 = 0x0D28;
const FRDM_OPENSDA: u16 = 0x1357;
const FRDM_KL25Z: u16 = 0x15A2;

const fn device(
    vendor_id: u16,
    product_id: u16,
    driver: DriverKind,
    default_dtr: bool,
) -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id,
        product_id,
        driver,
        default_dtr,
    }
}

/// Known devices. At most one entry per exact (vendor id, product id).
pub static DEVICES: &[DeviceDescriptor] = &[
    device(ARDUINO, 0, DriverKind::CdcAcm, false),
    // Uno
    device(ARDUINO, 0x0043, DriverKind::CdcAcm, false),
    device(ARDUINO, 0x0001, DriverKind::CdcAcm, false),
    device(ARDUINO, 0x0243, DriverKind::CdcAcm, false),
    device(ARDUINO_ORG, 0x0043, DriverKind::CdcAcm, false),
    // Leonardo
    device(ARDUINO, 0x0036, DriverKind::CdcAcm, true),
    device(ARDUINO, 0x8036, DriverKind::CdcAcm, true),
    device(ARDUINO_ORG, 0x0036, DriverKind::CdcAcm, true),
    device(ARDUINO_ORG, 0x8036, DriverKind::CdcAcm, true),
    device(FTDI, 0, DriverKind::Ftdi, false),
    device(SILABS, 0, DriverKind::Cp210x, false),
    // CH341 / CH340
    device(QINHENG, 0x5523, DriverKind::WinCh34x, false),
    device(QINHENG, 0x7523, DriverKind::WinCh34x, false),
    device(WCH, 0x5523, DriverKind::WinCh34x, false),
    device(WCH, 0x7523, DriverKind::WinCh34x, false),
    device(SPARKFUN, 0, DriverKind::CdcAcm, true),
    device(ADAFRUIT, 0, DriverKind::CdcAcm, true),
    device(RASPBERRY_PI, 0, DriverKind::CdcAcm, true),
    // XIAO RP2040
    device(SEEED, 0x0042, DriverKind::CdcAcm, true),
    device(MBED, 0, DriverKind::CdcAcm, false),
    device(FRDM_OPENSDA, 0, DriverKind::CdcAcm, false),
    device(FRDM_KL25Z, 0, DriverKind::CdcAcm, false),
];

/// Resolve a device: exact match first, then the vendor wildcard entry, then
/// [`UNKNOWN`].
pub fn lookup(vendor_id: u16, product_id: u16) -> &'static DeviceDescriptor {
    let find = |pid: u16| {
        DEVICES
            .iter()
            .find(|d| d.vendor_id == vendor_id && d.product_id == pid)
    };
    find(product_id).or_else(|| find(0)).unwrap_or(&UNKNOWN)
}

/// Return all known device entries.
pub fn devices() -> &'static [DeviceDescriptor] {
    DEVICES
}

/// Human readable vendor label, for diagnostics.
pub fn vendor_name(vendor_id: u16) -> &'static str {
    match vendor_id {
        ARDUINO => "Arduino",
        ARDUINO_ORG => "Arduino.org",
        FTDI => "FTDI",
        SILABS => "Silicon Labs",
        QINHENG => "QinHeng",
        WCH => "WCH",
        SPARKFUN => "SparkFun",
        ADAFRUIT => "Adafruit",
        RASPBERRY_PI => "Raspberry Pi",
        SEEED => "Seeed",
        MBED => "mbed",
        FRDM_OPENSDA => "P&E Micro",
        FRDM_KL25Z => "Freescale",
        _ => "unknown",
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn exact_match() {
        let d = lookup(ARDUINO, 0x8036);
        assert_eq!(d.driver, DriverKind::CdcAcm);
        assert!(d.default_dtr);
        assert_eq!(d.product_id, 0x8036);
    }

    #[test]
    fn ch340_exact_match() {
        assert_eq!(lookup(0x1A86, 0x7523).driver, DriverKind::WinCh34x);
    }

    #[test]
    fn vendor_wildcard() {
        let d = lookup(FTDI, 0x6001);
        assert_eq!(d.driver, DriverKind::Ftdi);
        assert_eq!(d.product_id, 0);

        let d = lookup(ARDUINO, 0x9999);
        assert_eq!(d.product_id, 0);
        assert!(!d.default_dtr);
    }

    #[test]
    fn vendor_without_wildcard_is_unknown() {
        // QinHeng only lists exact products.
        assert_eq!(*lookup(0x1A86, 0x55d4), UNKNOWN);
    }

    #[test]
    fn unknown_vendor() {
        assert_eq!(*lookup(0xDEAD, 0xBEEF), UNKNOWN);
        assert_eq!(lookup(0xDEAD, 0xBEEF).driver, DriverKind::Unknown);
    }

    #[test]
    fn at_most_one_entry_per_pair() {
        let mut seen = HashSet::new();
        for d in devices() {
            assert!(
                seen.insert((d.vendor_id, d.product_id)),
                "duplicate entry {:04x}:{:04x}",
                d.vendor_id,
                d.product_id
            );
        }
    }

    #[test]
    fn unknown_driver_defaults_to_cdc_acm() {
        assert_eq!(DriverKind::Unknown.or_default(), DriverKind::CdcAcm);
        assert_eq!(DriverKind::Ftdi.or_default(), DriverKind::Ftdi);
    }

    #[test]
    fn vendor_names() {
        assert_eq!(vendor_name(0x10C4), "Silicon Labs");
        assert_eq!(vendor_name(0x0001), "unknown");
    }
}
