//! Line configuration of a connection and the transport selection policy.
//!
//! Use the [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
//! pattern to set the configurable values.

pub use serialport::{DataBits, Parity, StopBits};

/// Default address of a WiFi serial bridge running as an access point.
pub const DEFAULT_WIFI_HOST: &str = "192.168.4.1";
/// Default TCP port carrying the data stream of a WiFi serial bridge.
pub const DEFAULT_DATA_PORT: u16 = 9001;

// =============================================================================
// Public Interface
// =============================================================================

// ConnectionConfig ============================================================

/// Line settings applied to a transport when it is opened, and saved and
/// restored around an upload.
///
/// This is a plain value: it is copied, never shared.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ConnectionConfig {
    /// The baud rate in symbols-per-second.
    pub baud_rate: u32,
    /// Number of bits used to represent a character sent on the line.
    pub data_bits: DataBits,
    /// Number of bits to use to signal the end of a character.
    pub stop_bits: StopBits,
    /// The type of parity to use for error checking.
    pub parity: Parity,
    /// State of the DTR control line.
    pub dtr_on: bool,
    /// State of the RTS control line.
    pub rts_on: bool,

    /// Restrict creation of `ConnectionConfig` instances unless through the
    /// `ConfigBuilder`.
    #[doc(hidden)]
    _private_use_builder: (),
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConfigBuilder::new().finalize()
    }
}

/// The builder for [`ConnectionConfig`] values.
///
/// All values are optional and default to 9600 baud, 8 data bits, 1 stop bit,
/// no parity and both control lines off.
///
/// **Example**
///
/// ```
/// use boardlink::ConfigBuilder;
///
/// let config = ConfigBuilder::new().baud_rate(115_200).dtr_rts(true, false).finalize();
/// assert_eq!(config.baud_rate, 115_200);
/// ```
pub struct ConfigBuilder {
    config: ConnectionConfig,
}

impl ConfigBuilder {
    /// Start building the configuration from default values.
    pub fn new() -> Self {
        ConfigBuilder {
            config: ConnectionConfig {
                baud_rate: 9_600,
                data_bits: DataBits::Eight,
                stop_bits: StopBits::One,
                parity: Parity::None,
                dtr_on: false,
                rts_on: false,
                _private_use_builder: (),
            },
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: ConnectionConfig) -> Self {
        ConfigBuilder { config }
    }

    /// Set the baud rate in symbols-per-second
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.config.baud_rate = baud_rate;
        self
    }

    /// Set the number of bits used to represent a character sent on the line
    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.config.data_bits = data_bits;
        self
    }

    /// Set the number of bits to use to signal the end of a character
    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.config.stop_bits = stop_bits;
        self
    }

    /// Set the type of parity to use for error checking
    pub fn parity(mut self, parity: Parity) -> Self {
        self.config.parity = parity;
        self
    }

    /// Set the DTR and RTS control lines
    pub fn dtr_rts(mut self, dtr_on: bool, rts_on: bool) -> Self {
        self.config.dtr_on = dtr_on;
        self.config.rts_on = rts_on;
        self
    }

    pub fn finalize(self) -> ConnectionConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// TransportPolicy =============================================================

/// Parameters of a WiFi serial bridge.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WifiParams {
    /// Host name or address of the bridge.
    pub host: String,
    /// TCP port carrying the data stream.
    pub data_port: u16,
    /// TCP port carrying line configuration commands.
    pub control_port: u16,
}

impl WifiParams {
    /// Build the parameters, substituting defaults for a missing host and for
    /// zero ports. The control port defaults to the port after the data port.
    pub fn new(host: Option<&str>, data_port: u16, control_port: u16) -> Self {
        let data_port = if data_port > 0 {
            data_port
        } else {
            DEFAULT_DATA_PORT
        };
        let control_port = if control_port > 0 {
            control_port
        } else {
            data_port.wrapping_add(1)
        };
        WifiParams {
            host: host.unwrap_or(DEFAULT_WIFI_HOST).to_owned(),
            data_port,
            control_port,
        }
    }
}

impl Default for WifiParams {
    fn default() -> Self {
        WifiParams::new(None, 0, 0)
    }
}

/// Parameters of a Bluetooth serial link.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct BluetoothParams {
    /// Name (or part of the port name) of the paired device. `None` picks the
    /// first Bluetooth serial port found.
    pub device_name: Option<String>,
}

/// Which transport kinds the selector may use, and their parameters.
///
/// The policy is an immutable value handed to the
/// [`TransportSelector`](crate::TransportSelector). Kinds are always tried in
/// the order USB, WiFi, Bluetooth.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TransportPolicy {
    /// Probe attached USB serial adapters.
    pub usb: bool,
    /// Probe a WiFi serial bridge when set.
    pub wifi: Option<WifiParams>,
    /// Probe a Bluetooth serial link when set.
    pub bluetooth: Option<BluetoothParams>,
}

impl TransportPolicy {
    /// USB only.
    pub fn usb_only() -> Self {
        PolicyBuilder::new().finalize()
    }

    /// Bluetooth, optionally preceded by USB.
    pub fn bluetooth(usb: bool, device_name: Option<&str>) -> Self {
        PolicyBuilder::new()
            .usb(usb)
            .bluetooth(device_name)
            .finalize()
    }

    /// WiFi, optionally preceded by USB.
    pub fn wifi(usb: bool, host: Option<&str>, data_port: u16, control_port: u16) -> Self {
        PolicyBuilder::new()
            .usb(usb)
            .wifi(WifiParams::new(host, data_port, control_port))
            .finalize()
    }

    /// WiFi then Bluetooth, optionally preceded by USB.
    pub fn wifi_and_bluetooth(
        usb: bool,
        device_name: Option<&str>,
        host: Option<&str>,
        data_port: u16,
        control_port: u16,
    ) -> Self {
        PolicyBuilder::new()
            .usb(usb)
            .wifi(WifiParams::new(host, data_port, control_port))
            .bluetooth(device_name)
            .finalize()
    }

    pub fn wifi_enabled(&self) -> bool {
        self.wifi.is_some()
    }

    pub fn bluetooth_enabled(&self) -> bool {
        self.bluetooth.is_some()
    }
}

impl Default for TransportPolicy {
    fn default() -> Self {
        Self::usb_only()
    }
}

/// The builder for [`TransportPolicy`] values. Starts with USB enabled and
/// the other kinds disabled.
pub struct PolicyBuilder {
    policy: TransportPolicy,
}

impl PolicyBuilder {
    pub fn new() -> Self {
        PolicyBuilder {
            policy: TransportPolicy {
                usb: true,
                wifi: None,
                bluetooth: None,
            },
        }
    }

    /// Enable or disable USB
    pub fn usb(mut self, enabled: bool) -> Self {
        self.policy.usb = enabled;
        self
    }

    /// Enable WiFi with the given bridge parameters
    pub fn wifi(mut self, params: WifiParams) -> Self {
        self.policy.wifi = Some(params);
        self
    }

    /// Enable Bluetooth, optionally restricted to a named device
    pub fn bluetooth(mut self, device_name: Option<&str>) -> Self {
        self.policy.bluetooth = Some(BluetoothParams {
            device_name: device_name.map(str::to_owned),
        });
        self
    }

    pub fn finalize(self) -> TransportPolicy {
        self.policy
    }
}

impl Default for PolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn all_default() {
    let config = ConfigBuilder::new().finalize();
    assert_eq!(
        config,
        ConnectionConfig {
            baud_rate: 9_600,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            dtr_on: false,
            rts_on: false,
            _private_use_builder: (),
        }
    );
    assert_eq!(config, ConnectionConfig::default());
}

#[test]
fn baud_rate() {
    let config = ConfigBuilder::new().baud_rate(115_200).finalize();
    assert_eq!(config.baud_rate, 115_200);
}

#[test]
fn data_bits_stop_bits_parity() {
    let config = ConfigBuilder::new()
        .data_bits(DataBits::Seven)
        .stop_bits(StopBits::Two)
        .parity(Parity::Even)
        .finalize();
    assert_eq!(config.data_bits, DataBits::Seven);
    assert_eq!(config.stop_bits, StopBits::Two);
    assert_eq!(config.parity, Parity::Even);
}

#[test]
fn dtr_rts() {
    let config = ConfigBuilder::new().dtr_rts(true, false).finalize();
    assert!(config.dtr_on);
    assert!(!config.rts_on);
}

#[test]
fn from_config_keeps_values() {
    let base = ConfigBuilder::new().baud_rate(57_600).finalize();
    let config = ConfigBuilder::from_config(base).parity(Parity::Odd).finalize();
    assert_eq!(config.baud_rate, 57_600);
    assert_eq!(config.parity, Parity::Odd);
}

#[test]
fn wifi_defaults() {
    let params = WifiParams::default();
    assert_eq!(params.host, "192.168.4.1");
    assert_eq!(params.data_port, 9001);
    assert_eq!(params.control_port, 9002);
}

#[test]
fn wifi_control_port_follows_data_port() {
    let params = WifiParams::new(Some("bridge.local"), 7000, 0);
    assert_eq!(params.host, "bridge.local");
    assert_eq!(params.data_port, 7000);
    assert_eq!(params.control_port, 7001);
}

#[test]
fn policy_usb_only() {
    let policy = TransportPolicy::usb_only();
    assert!(policy.usb);
    assert!(!policy.wifi_enabled());
    assert!(!policy.bluetooth_enabled());
}

#[test]
fn policy_wifi_and_bluetooth() {
    let policy = TransportPolicy::wifi_and_bluetooth(false, Some("HC-05"), None, 0, 0);
    assert!(!policy.usb);
    assert_eq!(policy.wifi, Some(WifiParams::default()));
    assert_eq!(
        policy.bluetooth.unwrap().device_name.as_deref(),
        Some("HC-05")
    );
}
