// SPDX-License-Identifier: Apache-2.0

#![deny(clippy::all, clippy::pedantic)]
#![deny(rustdoc::all)]

//! NAT-44 flow engine for the datapath.
//!
//! This package implements the address translation core: the flow table
//! with its paired inside/outside indexes, the LIFO external port pool,
//! the lazy expiry index, and the per-batch translation and sweep logic,
//! behind a single [`Forwarder`] value.
//!
//! # Example
//!
//! ```
//! use natd_nat::{Clock, DeviceId, Forwarder, NatConfig};
//!
//! let mut config = NatConfig::new();
//! config.external_addr = "203.0.113.1".parse().unwrap();
//! config.wan_device = DeviceId::new(1);
//! config.devices_mask = 0b11;
//! config.start_port = 40000;
//! config.max_flows = 1024;
//! config.expiration_time = 60;
//!
//! let forwarder = Forwarder::nat(config, Clock::wall()).unwrap();
//! # drop(forwarder);
//! ```
//!
//! # Limitations
//!
//! The package is subject to the following limitations:
//!
//! - Only NAT44 is supported, on a single external address.
//! - Only TCP and UDP are translated; everything else is dropped.
//! - One engine is owned by exactly one datapath thread; there is no
//!   locking and no sharding of a flow table across threads.
//! - State is volatile: flows do not survive a restart.

pub mod config;
mod engine;
mod expiry;
mod flow;
mod portpool;
mod table;
pub mod time;


pub use config::{ConfigError, DeviceId, MAX_DEVICES, NatConfig};
pub use engine::{Burst, Forwarder, MAX_BURST, NatEngine, PassThroughEngine, TxSink};
pub use flow::{Flow, FlowHandle, FlowId, Timestamp};
pub use time::{Clock, ManualClock};
