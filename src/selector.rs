//! Transport selection.
//!
//! Given a [`TransportPolicy`], the selector looks for a working transport in
//! a fixed order: USB, then WiFi, then Bluetooth. A candidate is accepted after
//! a successful *probe*: it is opened then immediately closed. The first
//! candidate passing the probe wins; a failed kind is never retried.
//!
//! ```text
//!          .-----.  probe ok
//!  USB? -->| USB |-------------------------------------> handle
//!          '-----'
//!             | none and WiFi/Bluetooth disabled --------> none
//!             v
//!          .------.  reachable and probe ok
//!  WiFi? ->| WiFi |------------------------------------> handle
//!          '------'
//!             v
//!          .-----------.  probe result is final
//!  BT?  -->| Bluetooth |-------------------------------> handle / none
//!          '-----------'
//! ```

use std::sync::Arc;

use log::{debug, info};

use crate::{
    environment::{Environment, SystemEnvironment},
    registry,
    settings::TransportPolicy,
    transport::{SystemFactory, Transport, TransportFactory},
};

// =============================================================================
// Public Interface
// =============================================================================

/// Picks the transport a [`Connection`](crate::Connection) uses.
pub struct TransportSelector {
    policy: TransportPolicy,
    environment: Arc<dyn Environment>,
    factory: Arc<dyn TransportFactory>,
}

impl TransportSelector {
    pub fn new(
        policy: TransportPolicy,
        environment: Arc<dyn Environment>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        TransportSelector {
            policy,
            environment,
            factory,
        }
    }

    /// Selector using the host system and the built-in transports.
    pub fn system(policy: TransportPolicy) -> Self {
        Self::new(policy, Arc::new(SystemEnvironment), Arc::new(SystemFactory))
    }

    pub fn policy(&self) -> &TransportPolicy {
        &self.policy
    }

    /// Return the first transport of the enabled kinds that passes a probe.
    /// The returned transport is closed.
    pub fn select(&self) -> Option<Box<dyn Transport>> {
        if self.policy.usb {
            if let Some(transport) = self.select_usb() {
                return Some(transport);
            }
            debug!("Nothing on USB");
            if !self.policy.wifi_enabled() && !self.policy.bluetooth_enabled() {
                return None;
            }
        }

        if let Some(wifi) = &self.policy.wifi {
            if self.environment.network_reachable(&wifi.host, wifi.data_port) {
                debug!("Network available");
                if let Some(transport) = probe(self.factory.wifi(wifi)) {
                    return Some(transport);
                }
            } else {
                debug!("No network available");
            }
        }

        if let Some(bluetooth) = &self.policy.bluetooth {
            // Last fallback: the probe result is final.
            return probe(self.factory.bluetooth(bluetooth.device_name.as_deref()));
        }

        None
    }

    fn select_usb(&self) -> Option<Box<dyn Transport>> {
        for interface in self.environment.usb_interfaces() {
            let descriptor = registry::lookup(interface.vendor_id, interface.product_id);
            let driver = descriptor.driver.or_default();
            debug!(
                "{} {:04x}:{:04x} ({}) -> {}",
                interface.port_name,
                interface.vendor_id,
                interface.product_id,
                registry::vendor_name(interface.vendor_id),
                driver.name()
            );
            if let Some(transport) = probe(self.factory.usb(&interface, driver, descriptor)) {
                return Some(transport);
            }
        }
        None
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// Open then close the transport to check that it works.
fn probe(mut transport: Box<dyn Transport>) -> Option<Box<dyn Transport>> {
    let kind = transport.physical_kind();
    if let Err(e) = transport.open() {
        debug!("{} probe failed to open: {}", kind, e);
        return None;
    }
    match transport.close() {
        Ok(()) => {
            info!("Selected {} transport ({})", kind, transport.driver_name());
            Some(transport)
        }
        Err(e) => {
            debug!("{} probe failed to close: {}", kind, e);
            None
        }
    }
}
