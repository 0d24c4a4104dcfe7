// SPDX-License-Identifier: Apache-2.0

//! Static engine configuration.
//!
//! A [`NatConfig`] is populated once, before the datapath starts, by an
//! outer configuration layer (the command line in the shipped binary) and
//! stays immutable for the lifetime of the process. Construction of a
//! forwarder validates it and refuses inconsistent records.

use net::eth::mac::Mac;
use std::fmt::Display;
use std::net::Ipv4Addr;

/// Highest number of devices a configuration can name, bounded by the
/// width of the devices mask.
pub const MAX_DEVICES: usize = 32;

/// Index of a port in the I/O driver's device tables.
///
/// Device ids are opaque to the engine; they select MAC table entries and
/// name receive/transmit queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(u16);

impl DeviceId {
    /// Wrap a raw device index.
    #[must_use]
    pub const fn new(raw: u16) -> DeviceId {
        DeviceId(raw)
    }

    /// The raw device index.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// The device index as a table subscript.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u16> for DeviceId {
    fn from(raw: u16) -> Self {
        DeviceId(raw)
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "device {}", self.0)
    }
}

/// Errors detected while validating a [`NatConfig`].
///
/// All of these are fail-fast: the process refuses to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A referenced device index does not fit the devices mask.
    #[error("{0} is out of range (the devices mask covers {MAX_DEVICES} devices)")]
    DeviceOutOfRange(DeviceId),
    /// The WAN device is not enabled in the devices mask.
    #[error("WAN {0} is not enabled in the devices mask")]
    WanDeviceDisabled(DeviceId),
    /// The main LAN device is not enabled in the devices mask.
    #[error("main LAN {0} is not enabled in the devices mask")]
    LanDeviceDisabled(DeviceId),
    /// The flow table capacity is zero.
    #[error("flow table capacity must be strictly positive")]
    NoFlows,
    /// The expiration time is zero.
    #[error("expiration time must be strictly positive")]
    NoExpiration,
    /// The external port range runs past the end of the port space.
    #[error("port range {start}..{start}+{count} does not fit the u16 port space")]
    PortRangeOverflow {
        /// First port of the range.
        start: u16,
        /// Number of ports in the range.
        count: u16,
    },
}

/// The static configuration record consumed at initialization.
#[derive(Debug, Clone)]
pub struct NatConfig {
    /// Public-side IPv4 address shared by all translated flows.
    pub external_addr: Ipv4Addr,
    /// Index of the WAN-facing port.
    pub wan_device: DeviceId,
    /// Default LAN device, used only by the pass-through forwarder.
    pub lan_main_device: DeviceId,
    /// Bitmask of enabled device indexes.
    pub devices_mask: u32,
    /// Source MAC written on egress, per device.
    pub device_macs: [Mac; MAX_DEVICES],
    /// Destination MAC written on egress, per device.
    pub endpoint_macs: [Mac; MAX_DEVICES],
    /// First external port of the pool.
    pub start_port: u16,
    /// Pool size and flow index capacity.
    pub max_flows: u16,
    /// Seconds of idleness after which a flow is expired.
    pub expiration_time: u32,
}

impl NatConfig {
    /// Create an empty configuration with every device enabled, for the
    /// outer configuration layer to fill in.
    #[must_use]
    pub fn new() -> NatConfig {
        NatConfig {
            external_addr: Ipv4Addr::UNSPECIFIED,
            wan_device: DeviceId::new(0),
            lan_main_device: DeviceId::new(0),
            devices_mask: u32::MAX,
            device_macs: [Mac::ZERO; MAX_DEVICES],
            endpoint_macs: [Mac::ZERO; MAX_DEVICES],
            start_port: 0,
            max_flows: 0,
            expiration_time: 0,
        }
    }

    /// Whether `device` is enabled in the devices mask.
    #[must_use]
    pub fn enabled(&self, device: DeviceId) -> bool {
        device.index() < MAX_DEVICES && self.devices_mask & (1 << device.index()) != 0
    }

    /// Check the record for inconsistencies.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_flows == 0 {
            return Err(ConfigError::NoFlows);
        }
        if self.expiration_time == 0 {
            return Err(ConfigError::NoExpiration);
        }
        if u32::from(self.start_port) + u32::from(self.max_flows) > u32::from(u16::MAX) + 1 {
            return Err(ConfigError::PortRangeOverflow {
                start: self.start_port,
                count: self.max_flows,
            });
        }
        for device in [self.wan_device, self.lan_main_device] {
            if device.index() >= MAX_DEVICES {
                return Err(ConfigError::DeviceOutOfRange(device));
            }
        }
        if !self.enabled(self.wan_device) {
            return Err(ConfigError::WanDeviceDisabled(self.wan_device));
        }
        if !self.enabled(self.lan_main_device) {
            return Err(ConfigError::LanDeviceDisabled(self.lan_main_device));
        }
        Ok(())
    }
}

impl Default for NatConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, DeviceId, NatConfig};

    fn valid_config() -> NatConfig {
        let mut config = NatConfig::new();
        config.external_addr = "203.0.113.1".parse().unwrap();
        config.wan_device = DeviceId::new(1);
        config.devices_mask = 0b11;
        config.start_port = 40000;
        config.max_flows = 1024;
        config.expiration_time = 60;
        config
    }

    #[test]
    fn accepts_valid_config() {
        assert_eq!(valid_config().validate(), Ok(()));
    }

    #[test]
    fn rejects_zero_flows() {
        let mut config = valid_config();
        config.max_flows = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoFlows));
    }

    #[test]
    fn rejects_zero_expiration() {
        let mut config = valid_config();
        config.expiration_time = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoExpiration));
    }

    #[test]
    fn rejects_port_range_overflow() {
        let mut config = valid_config();
        config.start_port = 65000;
        config.max_flows = 1000;
        assert_eq!(
            config.validate(),
            Err(ConfigError::PortRangeOverflow {
                start: 65000,
                count: 1000
            })
        );
    }

    #[test]
    fn accepts_range_ending_at_port_space_end() {
        let mut config = valid_config();
        config.start_port = 65000;
        config.max_flows = 536;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn rejects_disabled_wan_device() {
        let mut config = valid_config();
        config.devices_mask = 0b01;
        assert_eq!(
            config.validate(),
            Err(ConfigError::WanDeviceDisabled(DeviceId::new(1)))
        );
    }

    #[test]
    fn rejects_disabled_lan_device() {
        let mut config = valid_config();
        config.devices_mask = 0b10;
        config.lan_main_device = DeviceId::new(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::LanDeviceDisabled(DeviceId::new(0)))
        );
    }

    #[test]
    fn rejects_out_of_range_wan_device() {
        let mut config = valid_config();
        config.wan_device = DeviceId::new(40);
        assert_eq!(
            config.validate(),
            Err(ConfigError::DeviceOutOfRange(DeviceId::new(40)))
        );
    }

    #[test]
    fn enabled_respects_mask_and_range() {
        let config = valid_config();
        assert!(config.enabled(DeviceId::new(0)));
        assert!(config.enabled(DeviceId::new(1)));
        assert!(!config.enabled(DeviceId::new(2)));
        assert!(!config.enabled(DeviceId::new(40)));
    }
}
