// SPDX-License-Identifier: Apache-2.0

//! Per-batch translation engine and expiry sweep.

use crate::config::{ConfigError, DeviceId, NatConfig};
use crate::expiry::ExpiryIndex;
use crate::flow::{Flow, FlowHandle, FlowId, Timestamp};
use crate::portpool::PortPool;
use crate::table::FlowTable;
use crate::time::Clock;
use arrayvec::ArrayVec;
use net::buffer::PacketBufferMut;
use net::frame::{FrameView, rewrite_l2};
use tracing::{debug, info, trace};

/// Largest number of frames a single transmit burst carries.
pub const MAX_BURST: usize = 64;

/// Per-call scratch holding the frames queued for one transmit burst.
pub type Burst<Buf> = ArrayVec<Buf, MAX_BURST>;

/// Non-blocking transmit side of the I/O layer.
pub trait TxSink<Buf: PacketBufferMut> {
    /// Hand `frames` to the device's transmit queue.
    ///
    /// The sink removes the frames it accepts from the front of `frames`
    /// and returns how many it took. Frames left behind were declined
    /// (queue backpressure); they belong to the caller, which frees them.
    /// The call must not block.
    fn transmit(&mut self, device: DeviceId, frames: &mut Burst<Buf>) -> usize;
}

/// A packet forwarder, either the NAT engine or the pass-through variant.
///
/// The variant is selected once at construction; per-packet processing
/// never dispatches on it again beyond this single match.
#[derive(Debug)]
pub enum Forwarder {
    /// Forward between the WAN and main LAN devices without translation.
    PassThrough(PassThroughEngine),
    /// Translate and track flows.
    Nat(NatEngine),
}

impl Forwarder {
    /// Build a NAT forwarder.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the configuration is inconsistent.
    pub fn nat(config: NatConfig, clock: Clock) -> Result<Forwarder, ConfigError> {
        Ok(Forwarder::Nat(NatEngine::new(config, clock)?))
    }

    /// Build a pass-through forwarder.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the configuration is inconsistent.
    pub fn pass_through(config: NatConfig) -> Result<Forwarder, ConfigError> {
        Ok(Forwarder::PassThrough(PassThroughEngine::new(config)?))
    }

    /// Process one received burst. Every buffer in `bufs` is consumed:
    /// transmitted through `tx` or freed.
    pub fn process_batch<Buf, Tx>(
        &mut self,
        device: DeviceId,
        bufs: impl IntoIterator<Item = Buf>,
        tx: &mut Tx,
    ) where
        Buf: PacketBufferMut,
        Tx: TxSink<Buf>,
    {
        match self {
            Forwarder::PassThrough(engine) => engine.process_batch(device, bufs, tx),
            Forwarder::Nat(engine) => engine.process_batch(device, bufs, tx),
        }
    }
}

/// Transmit the queued frames and free whatever the sink declined.
fn flush_burst<Buf, Tx>(tx: &mut Tx, device: DeviceId, burst: &mut Burst<Buf>)
where
    Buf: PacketBufferMut,
    Tx: TxSink<Buf>,
{
    if burst.is_empty() {
        return;
    }
    let queued = burst.len();
    let sent = tx.transmit(device, burst);
    if sent < queued {
        debug!(
            "transmit queue declined {declined} of {queued} frames on {device}",
            declined = queued - sent
        );
    }
    burst.clear();
}

/// Forwarder that does no flow tracking.
///
/// Traffic received on the WAN device exits the main LAN device and
/// everything else exits the WAN device, with only the L2 addresses
/// rewritten. The recipient is expected to discard what it did not ask
/// for.
#[derive(Debug)]
pub struct PassThroughEngine {
    config: NatConfig,
}

impl PassThroughEngine {
    /// Validate `config` and build the engine.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the configuration is inconsistent.
    pub fn new(config: NatConfig) -> Result<PassThroughEngine, ConfigError> {
        config.validate()?;
        Ok(PassThroughEngine { config })
    }

    /// Process one received burst.
    pub fn process_batch<Buf, Tx>(
        &mut self,
        device: DeviceId,
        bufs: impl IntoIterator<Item = Buf>,
        tx: &mut Tx,
    ) where
        Buf: PacketBufferMut,
        Tx: TxSink<Buf>,
    {
        if !self.config.enabled(device) {
            debug!("dropping burst received on disabled {device}");
            bufs.into_iter().for_each(drop);
            return;
        }
        let out_device = if device == self.config.wan_device {
            self.config.lan_main_device
        } else {
            self.config.wan_device
        };
        let source = self.config.device_macs[out_device.index()];
        let destination = self.config.endpoint_macs[out_device.index()];

        let mut burst: Burst<Buf> = Burst::new();
        for mut buf in bufs {
            if !rewrite_l2(buf.as_mut(), source, destination) {
                trace!("dropping runt frame");
                continue;
            }
            if burst.is_full() {
                flush_burst(tx, out_device, &mut burst);
            }
            burst.push(buf);
        }
        flush_burst(tx, out_device, &mut burst);
    }
}

/// The NAT engine: one flow table, one port pool, one expiry index, owned
/// by a single datapath thread.
#[derive(Debug)]
pub struct NatEngine {
    pub(crate) config: NatConfig,
    pub(crate) table: FlowTable,
    pub(crate) ports: PortPool,
    pub(crate) expiry: ExpiryIndex,
    pub(crate) clock: Clock,
    pub(crate) now: Timestamp,
}

impl NatEngine {
    /// Validate `config` and build the engine with all state pre-sized to
    /// `max_flows`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the configuration is inconsistent.
    pub fn new(config: NatConfig, clock: Clock) -> Result<NatEngine, ConfigError> {
        config.validate()?;
        info!(
            "NAT engine: external {addr}, ports {start}..{end}, {flows} flows, {expire}s expiry",
            addr = config.external_addr,
            start = config.start_port,
            end = u32::from(config.start_port) + u32::from(config.max_flows),
            flows = config.max_flows,
            expire = config.expiration_time,
        );
        Ok(NatEngine {
            table: FlowTable::with_capacity(
                config.external_addr,
                config.start_port,
                config.max_flows,
            ),
            ports: PortPool::new(config.start_port, config.max_flows),
            expiry: ExpiryIndex::new(),
            clock,
            now: 0,
            config,
        })
    }

    /// Process one received burst: sample the clock, run the expiry sweep,
    /// then translate in the direction implied by the input device.
    pub fn process_batch<Buf, Tx>(
        &mut self,
        device: DeviceId,
        bufs: impl IntoIterator<Item = Buf>,
        tx: &mut Tx,
    ) where
        Buf: PacketBufferMut,
        Tx: TxSink<Buf>,
    {
        self.now = self.clock.now();
        self.sweep_expired();

        if !self.config.enabled(device) {
            debug!("dropping burst received on disabled {device}");
            bufs.into_iter().for_each(drop);
            return;
        }
        if device == self.config.wan_device {
            self.process_return(bufs, tx);
        } else {
            self.process_forward(device, bufs, tx);
        }
    }

    /// Walk expired buckets of the expiry index and tear the flows down:
    /// out of both lookup indexes, port back to the pool, record freed.
    ///
    /// Entries are resolved through handles. An entry whose bucket
    /// timestamp differs from the flow's `last_seen` is a stale lazy
    /// duplicate left behind by a refresh; the newest entry is the only
    /// authoritative one. An entry whose slot is already empty was freed
    /// through an earlier entry, so each flow is freed exactly once.
    fn sweep_expired(&mut self) {
        let expiration = Timestamp::from(self.config.expiration_time);
        while let Some((bucket_ts, handles)) = self.expiry.pop_expired(self.now, expiration) {
            for handle in handles {
                let authoritative = self
                    .table
                    .get(handle)
                    .is_some_and(|flow| flow.last_seen == bucket_ts);
                if !authoritative {
                    continue;
                }
                if let Some(flow) = self.table.remove(handle) {
                    debug!(
                        "expiring flow {id}, releasing port {port}",
                        id = flow.id,
                        port = flow.external_port
                    );
                    self.ports.release(flow.external_port);
                }
            }
        }
    }

    /// Note traffic on a flow. At most one expiry entry is added per flow
    /// per second; within the same second the refresh is a no-op.
    fn refresh(&mut self, handle: FlowHandle) {
        let now = self.now;
        let Some(flow) = self.table.get_mut(handle) else {
            return;
        };
        if flow.last_seen == now {
            return;
        }
        flow.last_seen = now;
        self.expiry.insert(now, handle);
    }

    /// Return direction: traffic arriving on the WAN device, matched
    /// against the outside index. Each packet is transmitted on its own,
    /// since different flows imply different output devices.
    fn process_return<Buf, Tx>(&mut self, bufs: impl IntoIterator<Item = Buf>, tx: &mut Tx)
    where
        Buf: PacketBufferMut,
        Tx: TxSink<Buf>,
    {
        for mut buf in bufs {
            let Some(out_device) = self.translate_return(buf.as_mut()) else {
                continue;
            };
            let mut burst: Burst<Buf> = Burst::new();
            burst.push(buf);
            flush_burst(tx, out_device, &mut burst);
        }
    }

    /// Rewrite one return-direction frame in place. Returns the egress
    /// device, or `None` when the packet is dropped.
    fn translate_return(&mut self, data: &mut [u8]) -> Option<DeviceId> {
        let mut frame = match FrameView::parse(data) {
            Ok(frame) => frame,
            Err(error) => {
                trace!("dropping inbound frame: {error}");
                return None;
            }
        };
        let key = FlowId::from_frame(&frame);
        let Some(handle) = self.table.lookup_outside(&key) else {
            trace!("no flow for inbound {key}");
            return None;
        };
        self.refresh(handle);
        let flow = self.table.get(handle)?;
        let out_device = flow.internal_device;
        let dst_addr = flow.id.src_addr;
        let dst_port = flow.id.src_port;

        frame.set_eth_source(self.config.device_macs[out_device.index()]);
        frame.set_eth_destination(self.config.endpoint_macs[out_device.index()]);
        frame.set_dst_addr(dst_addr);
        frame.set_dst_port(dst_port);
        frame.update_ipv4_checksum();
        frame.update_transport_checksum();
        Some(out_device)
    }

    /// Forward direction: traffic arriving on a LAN device. Everything
    /// exits the WAN device, so rewritten frames are batched and sent as
    /// one burst.
    fn process_forward<Buf, Tx>(
        &mut self,
        device: DeviceId,
        bufs: impl IntoIterator<Item = Buf>,
        tx: &mut Tx,
    ) where
        Buf: PacketBufferMut,
        Tx: TxSink<Buf>,
    {
        let wan_device = self.config.wan_device;
        let mut burst: Burst<Buf> = Burst::new();
        for mut buf in bufs {
            if !self.translate_forward(device, buf.as_mut()) {
                continue;
            }
            if burst.is_full() {
                flush_burst(tx, wan_device, &mut burst);
            }
            burst.push(buf);
        }
        flush_burst(tx, wan_device, &mut burst);
    }

    /// Rewrite one forward-direction frame in place, creating the flow on
    /// first sight. Returns false when the packet is dropped.
    fn translate_forward(&mut self, device: DeviceId, data: &mut [u8]) -> bool {
        let mut frame = match FrameView::parse(data) {
            Ok(frame) => frame,
            Err(error) => {
                trace!("dropping outbound frame: {error}");
                return false;
            }
        };
        let key = FlowId::from_frame(&frame);
        let handle = match self.table.lookup_inside(&key) {
            Some(handle) => handle,
            None => {
                let Some(port) = self.ports.acquire() else {
                    debug!("port pool exhausted, dropping first packet of {key}");
                    return false;
                };
                debug!("new flow {key} on external port {port}");
                self.table.insert(Flow::new(key, device, port))
            }
        };
        self.refresh(handle);
        let Some(flow) = self.table.get(handle) else {
            return false;
        };
        let external_port = flow.external_port;

        let wan_device = self.config.wan_device;
        frame.set_eth_source(self.config.device_macs[wan_device.index()]);
        frame.set_eth_destination(self.config.endpoint_macs[wan_device.index()]);
        frame.set_src_addr(self.config.external_addr);
        frame.set_src_port(external_port);
        frame.update_ipv4_checksum();
        frame.update_transport_checksum();
        true
    }
}
