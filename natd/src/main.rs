// SPDX-License-Identifier: Apache-2.0

#![deny(clippy::all, clippy::pedantic)]
#![deny(rustdoc::all)]
#![allow(rustdoc::missing_crate_level_docs)]

mod args;
mod driver;

use crate::args::{CmdArgs, Parser};
use crate::driver::KernelIo;
use nat::{Clock, Forwarder, NatConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn print_config(config: &NatConfig, nop: bool) {
    info!("--- NAT config ---");
    info!("Mode: {}", if nop { "pass-through" } else { "nat" });
    info!("Devices mask: {:#x}", config.devices_mask);
    info!("WAN device: {}", config.wan_device.as_u16());
    info!("Main LAN device: {}", config.lan_main_device.as_u16());
    info!("External IP: {}", config.external_addr);
    let macs = config.device_macs.iter().zip(config.endpoint_macs.iter());
    for (index, (own, end)) in macs.enumerate() {
        let enabled = config.devices_mask & (1 << index) != 0;
        if !enabled || (own.is_zero() && end.is_zero()) {
            continue;
        }
        info!("Device {index} own-mac: {own}, end-mac: {end}");
    }
    info!("Starting port: {}", config.start_port);
    info!("Max flows: {}", config.max_flows);
    info!("Expiration time: {}s", config.expiration_time);
    info!("--- ---------- ---");
}

fn main() {
    init_logging();

    let args = CmdArgs::parse();
    let config = match args.nat_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    print_config(&config, args.nop());

    let bindings = match args.interfaces() {
        Ok(bindings) => bindings,
        Err(e) => {
            error!("Invalid interface bindings: {e}");
            std::process::exit(1);
        }
    };
    let enabled: Vec<_> = bindings
        .into_iter()
        .filter(|(device, ifname)| {
            if config.enabled(*device) {
                true
            } else {
                info!("Skipping disabled {device} ('{ifname}')");
                false
            }
        })
        .collect();
    if enabled.is_empty() {
        error!("No enabled device is bound to an interface, nothing to do");
        std::process::exit(1);
    }

    let forwarder = if args.nop() {
        Forwarder::pass_through(config)
    } else {
        Forwarder::nat(config, Clock::wall())
    };
    let mut forwarder = match forwarder {
        Ok(forwarder) => forwarder,
        Err(e) => {
            error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let io = match KernelIo::open(&enabled) {
        Ok(io) => io,
        Err(e) => {
            error!("Failed to open packet sockets: {e}");
            std::process::exit(1);
        }
    };

    // State is volatile; termination is the shutdown protocol.
    if let Err(e) = ctrlc::set_handler(|| {
        info!("Shutting down");
        std::process::exit(0);
    }) {
        error!("Failed to set SIGINT handler: {e}");
        std::process::exit(1);
    }

    info!("Forwarding packets");
    io.run(&mut forwarder);
}
