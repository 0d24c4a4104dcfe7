// SPDX-License-Identifier: Apache-2.0

//! Command line of the NAT datapath.
//!
//! The command line is the only configuration source: it populates the
//! static [`NatConfig`] record before the datapath starts. The option
//! surface mirrors the classic benchmark NAT invocations, e.g.
//!
//! ```text
//! natd --wan 1 --extip 203.0.113.1 --starting-port 40000 --max-flows 1024 \
//!      --expire 60 --eth-own 0,02:00:00:00:00:10 --eth-dest 0,02:00:00:00:00:20 \
//!      --eth-own 1,02:00:00:00:00:11 --eth-dest 1,02:00:00:00:00:21 \
//!      --interface 0,veth-lan --interface 1,veth-wan
//! ```

pub(crate) use clap::Parser;
use nat::{DeviceId, MAX_DEVICES, NatConfig};
use net::eth::mac::Mac;
use std::net::Ipv4Addr;

#[derive(Parser)]
#[command(name = "natd")]
#[command(version)]
#[command(about = "Userspace NAT-44 datapath", long_about = None)]
pub(crate) struct CmdArgs {
    /// External (public-side) IPv4 address.
    #[arg(long = "extip", value_name = "IP")]
    external_addr: Ipv4Addr,

    /// Index of the WAN-facing device.
    #[arg(long = "wan", value_name = "DEVICE")]
    wan_device: u16,

    /// Main LAN device, used by the pass-through forwarder.
    #[arg(long = "lan-dev", value_name = "DEVICE", default_value_t = 0)]
    lan_main_device: u16,

    /// Bitmask of enabled device indexes, in hex. All devices are enabled
    /// by default.
    #[arg(long = "devs-mask", value_name = "MASK", value_parser = parse_hex_mask)]
    devices_mask: Option<u32>,

    /// Own MAC address of a device, as <device>,<mac>.
    #[arg(long = "eth-own", value_name = "DEVICE,MAC")]
    eth_own: Vec<String>,

    /// MAC address of the endpoint behind a device, as <device>,<mac>.
    #[arg(long = "eth-dest", value_name = "DEVICE,MAC")]
    eth_dest: Vec<String>,

    /// First port of the external port range.
    #[arg(long = "starting-port", value_name = "PORT", default_value_t = 1025)]
    start_port: u16,

    /// Flow table capacity, which is also the size of the external port
    /// range.
    #[arg(long = "max-flows", value_name = "N", default_value_t = 1024)]
    max_flows: u16,

    /// Seconds of idleness after which a flow is expired.
    #[arg(long = "expire", value_name = "SECONDS", default_value_t = 60)]
    expiration_time: u32,

    /// Forward between the WAN and main LAN devices without translation.
    #[arg(long)]
    nop: bool,

    /// Kernel interface bound to a device index, as <device>,<ifname>.
    #[arg(long = "interface", value_name = "DEVICE,IFNAME")]
    interface: Vec<String>,
}

fn parse_hex_mask(value: &str) -> Result<u32, String> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid devices mask '{value}': {e}"))
}

fn device_from_index(raw: u16) -> Result<DeviceId, String> {
    if usize::from(raw) >= MAX_DEVICES {
        return Err(format!("device index {raw} is out of range"));
    }
    Ok(DeviceId::new(raw))
}

fn parse_device(value: &str) -> Result<DeviceId, String> {
    let raw: u16 = value
        .parse()
        .map_err(|e| format!("invalid device index '{value}': {e}"))?;
    device_from_index(raw)
}

/// Split a `<device>,<rest>` pair as used by `--eth-own`, `--eth-dest`
/// and `--interface`.
fn parse_device_pair(value: &str) -> Result<(DeviceId, &str), String> {
    let (device, rest) = value
        .split_once(',')
        .ok_or_else(|| format!("expected <device>,... but got '{value}'"))?;
    Ok((parse_device(device)?, rest))
}

impl CmdArgs {
    pub(crate) fn nop(&self) -> bool {
        self.nop
    }

    /// Build the engine configuration record from the parsed options.
    pub(crate) fn nat_config(&self) -> Result<NatConfig, String> {
        let mut config = NatConfig::new();
        config.external_addr = self.external_addr;
        config.wan_device = device_from_index(self.wan_device)?;
        config.lan_main_device = device_from_index(self.lan_main_device)?;
        if let Some(mask) = self.devices_mask {
            config.devices_mask = mask;
        }
        config.start_port = self.start_port;
        config.max_flows = self.max_flows;
        config.expiration_time = self.expiration_time;

        for entry in &self.eth_own {
            let (device, mac) = parse_device_pair(entry)?;
            config.device_macs[device.index()] =
                Mac::try_from(mac).map_err(|e| e.to_string())?;
        }
        for entry in &self.eth_dest {
            let (device, mac) = parse_device_pair(entry)?;
            config.endpoint_macs[device.index()] =
                Mac::try_from(mac).map_err(|e| e.to_string())?;
        }
        Ok(config)
    }

    /// The `(device, kernel interface)` bindings for the polling driver.
    pub(crate) fn interfaces(&self) -> Result<Vec<(DeviceId, String)>, String> {
        let mut bindings = Vec::with_capacity(self.interface.len());
        for entry in &self.interface {
            let (device, ifname) = parse_device_pair(entry)?;
            if ifname.is_empty() {
                return Err(format!("empty interface name in '{entry}'"));
            }
            if bindings.iter().any(|(bound, _)| *bound == device) {
                return Err(format!("{device} is bound to more than one interface"));
            }
            bindings.push((device, ifname.to_string()));
        }
        Ok(bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::{CmdArgs, Parser};
    use nat::DeviceId;
    use net::eth::mac::Mac;

    fn parse(args: &[&str]) -> CmdArgs {
        CmdArgs::try_parse_from(
            std::iter::once("natd").chain(args.iter().copied()),
        )
        .expect("Failed to parse args")
    }

    #[test]
    fn full_command_line_builds_a_config() {
        let args = parse(&[
            "--extip",
            "203.0.113.1",
            "--wan",
            "1",
            "--devs-mask",
            "0x3",
            "--starting-port",
            "40000",
            "--max-flows",
            "4",
            "--expire",
            "60",
            "--eth-own",
            "1,02:00:00:00:00:11",
            "--eth-dest",
            "1,02:00:00:00:00:21",
            "--interface",
            "0,veth-lan",
            "--interface",
            "1,veth-wan",
        ]);
        let config = args.nat_config().unwrap();
        assert_eq!(config.external_addr, "203.0.113.1".parse::<std::net::Ipv4Addr>().unwrap());
        assert_eq!(config.wan_device, DeviceId::new(1));
        assert_eq!(config.devices_mask, 0x3);
        assert_eq!(config.start_port, 40000);
        assert_eq!(config.max_flows, 4);
        assert_eq!(
            config.device_macs[1],
            Mac::try_from("02:00:00:00:00:11").unwrap()
        );
        assert_eq!(
            config.endpoint_macs[1],
            Mac::try_from("02:00:00:00:00:21").unwrap()
        );
        assert!(config.validate().is_ok());

        let bindings = args.interfaces().unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0], (DeviceId::new(0), "veth-lan".to_string()));
    }

    #[test]
    fn mask_defaults_to_all_devices() {
        let args = parse(&["--extip", "203.0.113.1", "--wan", "1"]);
        assert_eq!(args.nat_config().unwrap().devices_mask, u32::MAX);
    }

    #[test]
    fn rejects_malformed_mac_pair() {
        let args = parse(&["--extip", "203.0.113.1", "--wan", "1", "--eth-own", "1:nope"]);
        assert!(args.nat_config().is_err());
    }

    #[test]
    fn rejects_out_of_range_device_in_pair() {
        let args = parse(&[
            "--extip",
            "203.0.113.1",
            "--wan",
            "1",
            "--eth-own",
            "40,02:00:00:00:00:11",
        ]);
        assert!(args.nat_config().is_err());
    }

    #[test]
    fn rejects_duplicate_interface_binding() {
        let args = parse(&[
            "--extip",
            "203.0.113.1",
            "--wan",
            "1",
            "--interface",
            "0,veth-a",
            "--interface",
            "0,veth-b",
        ]);
        assert!(args.interfaces().is_err());
    }
}
