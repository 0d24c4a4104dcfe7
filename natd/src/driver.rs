// SPDX-License-Identifier: Apache-2.0

//! Kernel packet driver.
//!
//! Polls one `AF_PACKET` socket per configured device and feeds bursts of
//! received frames to the forwarder. The same socket table is the
//! forwarder's transmit sink, so backpressure on a device's queue
//! declines the tail of a burst instead of blocking the datapath.

use afpacket::sync::RawPacketStream;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use nat::{Burst, DeviceId, Forwarder, TxSink};
use net::buffer::TestBuffer;
use netdev::Interface;
use tracing::{debug, error, info, trace, warn};

/// Frames pulled from one socket per poll wakeup; the trade-off between
/// latency and throughput.
pub(crate) const BATCH_SIZE: usize = 32;

/// One device's packet socket.
struct PortSocket {
    device: DeviceId,
    name: String,
    sock: RawPacketStream,
    raw_fd: RawFd,
}

impl PortSocket {
    /// Open a non-blocking packet socket bound to `ifname`.
    fn open(device: DeviceId, ifname: &str) -> io::Result<Self> {
        let mut sock = RawPacketStream::new().map_err(|e| {
            error!("Failed to open raw sock for interface {ifname}: {e}");
            e
        })?;
        sock.set_non_blocking();
        sock.bind(ifname)
            .inspect_err(|e| error!("Failed to bind raw sock to interface {ifname}: {e}"))?;
        let raw_fd = sock.as_raw_fd();
        debug!("Bound {device} to interface '{ifname}'");
        Ok(Self {
            device,
            name: ifname.to_owned(),
            sock,
            raw_fd,
        })
    }
}

/// The driver: a poller over every bound device socket.
pub(crate) struct KernelIo {
    poll: Poll,
    ports: Vec<PortSocket>,
}

impl KernelIo {
    /// Open and register a socket for every `(device, interface)` binding.
    ///
    /// Interface names are checked against the kernel's interface list
    /// first, so a typo fails fast instead of binding nothing.
    pub(crate) fn open(bindings: &[(DeviceId, String)]) -> io::Result<KernelIo> {
        let known: Vec<Interface> = netdev::get_interfaces();
        let poll = Poll::new()?;
        let mut ports = Vec::with_capacity(bindings.len());
        for (device, ifname) in bindings {
            if !known.iter().any(|iface| &iface.name == ifname) {
                error!("Unknown interface '{ifname}'");
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("unknown interface '{ifname}'"),
                ));
            }
            let port = PortSocket::open(*device, ifname)?;
            poll.registry().register(
                &mut SourceFd(&port.raw_fd),
                Token(ports.len()),
                Interest::READABLE,
            )?;
            ports.push(port);
        }
        Ok(KernelIo { poll, ports })
    }

    /// Pull up to [`BATCH_SIZE`] frames off one socket.
    fn recv_batch(port: &mut PortSocket) -> Vec<TestBuffer> {
        let mut raw = [0u8; TestBuffer::CAPACITY];
        let mut bufs = Vec::with_capacity(BATCH_SIZE);
        while bufs.len() < BATCH_SIZE {
            match port.sock.read(&mut raw) {
                Ok(0) => break,
                Ok(bytes) => bufs.push(TestBuffer::from_raw_data(&raw[..bytes])),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("Read error on '{}': {e}", port.name);
                    break;
                }
            }
        }
        bufs
    }

    /// The dispatch loop: poll, receive bursts, hand each burst to the
    /// forwarder. Runs until the process is terminated.
    pub(crate) fn run(mut self, forwarder: &mut Forwarder) -> ! {
        let poll_timeout = Some(Duration::from_millis(2));
        let mut events = Events::with_capacity(64);
        info!("Polling {} devices", self.ports.len());
        loop {
            if let Err(e) = self.poll.poll(&mut events, poll_timeout) {
                if e.kind() != io::ErrorKind::Interrupted {
                    warn!("Poll error: {e}");
                }
                continue;
            }
            for event in &events {
                if !event.is_readable() {
                    continue;
                }
                let index = event.token().0;
                let Some(port) = self.ports.get_mut(index) else {
                    continue;
                };
                let device = port.device;
                let bufs = Self::recv_batch(port);
                if bufs.is_empty() {
                    continue;
                }
                trace!("RX burst of {} frames on {device}", bufs.len());
                forwarder.process_batch(device, bufs, &mut self);
            }
        }
    }
}

impl TxSink<TestBuffer> for KernelIo {
    fn transmit(&mut self, device: DeviceId, frames: &mut Burst<TestBuffer>) -> usize {
        let Some(port) = self.ports.iter_mut().find(|port| port.device == device) else {
            debug!("No interface bound to {device}, declining burst");
            return 0;
        };
        let mut sent = 0;
        for frame in frames.iter() {
            match port.sock.write_all(frame.as_ref()) {
                Ok(()) => sent += 1,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("TX failed on '{}': {e}", port.name);
                    break;
                }
            }
        }
        frames.drain(..sent);
        sent
    }
}
