// SPDX-License-Identifier: Apache-2.0

//! Flow identity and record types.

use crate::config::DeviceId;
use net::frame::{FrameView, TransProto};
use std::fmt::Display;
use std::net::Ipv4Addr;

/// Seconds since an arbitrary epoch; coarse one-second granularity.
pub type Timestamp = u64;

/// Marks a flow that has never been refreshed. Never equal to a sampled
/// clock value, which makes the creation-path refresh unconditional.
pub(crate) const NEVER_SEEN: Timestamp = Timestamp::MAX;

/// The packed 5-tuple identifying a flow.
///
/// Equality, ordering and hashing are derived field-wise over all five
/// fields, so two ids compare equal exactly when their on-wire tuples do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowId {
    /// Source IPv4 address.
    pub src_addr: Ipv4Addr,
    /// Source transport port.
    pub src_port: u16,
    /// Destination IPv4 address.
    pub dst_addr: Ipv4Addr,
    /// Destination transport port.
    pub dst_port: u16,
    /// Transport protocol.
    pub protocol: TransProto,
}

impl FlowId {
    /// Extract the 5-tuple of a parsed frame, exactly as it appears on the
    /// wire.
    #[must_use]
    pub fn from_frame(frame: &FrameView<'_>) -> FlowId {
        FlowId {
            src_addr: frame.src_addr(),
            src_port: frame.src_port(),
            dst_addr: frame.dst_addr(),
            dst_port: frame.dst_port(),
            protocol: frame.protocol(),
        }
    }

    /// The key under which a flow with this inside id is indexed for
    /// return-direction lookups: the peer becomes the source and the
    /// translated `(external_addr, external_port)` pair the destination.
    #[must_use]
    pub fn outside_key(&self, external_addr: Ipv4Addr, external_port: u16) -> FlowId {
        FlowId {
            src_addr: self.dst_addr,
            src_port: self.dst_port,
            dst_addr: external_addr,
            dst_port: external_port,
            protocol: self.protocol,
        }
    }
}

impl Display for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}/{}",
            self.src_addr, self.src_port, self.dst_addr, self.dst_port, self.protocol
        )
    }
}

/// Stable handle naming a flow's slot in the owning table.
///
/// All indexes refer to flows through handles; none of them holds a
/// reference into the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowHandle(u16);

impl FlowHandle {
    pub(crate) const fn new(raw: u16) -> FlowHandle {
        FlowHandle(raw)
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A tracked flow.
///
/// `id` is the inside view: the 5-tuple exactly as first observed from the
/// LAN side.
#[derive(Debug, Clone)]
pub struct Flow {
    /// The inside 5-tuple.
    pub id: FlowId,
    /// LAN-side device the flow was first seen on; return traffic leaves
    /// through it.
    pub internal_device: DeviceId,
    /// External port drawn from the pool at creation.
    pub external_port: u16,
    /// Timestamp of the newest packet, one-second granularity.
    pub last_seen: Timestamp,
}

impl Flow {
    pub(crate) fn new(id: FlowId, internal_device: DeviceId, external_port: u16) -> Flow {
        Flow {
            id,
            internal_device,
            external_port,
            last_seen: NEVER_SEEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FlowId, TransProto};
    use std::net::Ipv4Addr;

    fn sample_id() -> FlowId {
        FlowId {
            src_addr: Ipv4Addr::new(10, 0, 0, 2),
            src_port: 53124,
            dst_addr: Ipv4Addr::new(198, 51, 100, 7),
            dst_port: 80,
            protocol: TransProto::Tcp,
        }
    }

    #[test]
    fn outside_key_swaps_peer_and_translation() {
        let id = sample_id();
        let outside = id.outside_key(Ipv4Addr::new(203, 0, 113, 1), 40003);
        assert_eq!(outside.src_addr, id.dst_addr);
        assert_eq!(outside.src_port, id.dst_port);
        assert_eq!(outside.dst_addr, Ipv4Addr::new(203, 0, 113, 1));
        assert_eq!(outside.dst_port, 40003);
        assert_eq!(outside.protocol, id.protocol);
    }

    #[test]
    fn protocol_distinguishes_ids() {
        let tcp = sample_id();
        let udp = FlowId {
            protocol: TransProto::Udp,
            ..tcp
        };
        assert_ne!(tcp, udp);
    }

    #[test]
    fn ids_are_totally_ordered() {
        let a = sample_id();
        let b = FlowId {
            src_port: a.src_port + 1,
            ..a
        };
        assert!(a < b);
        assert_eq!(a.cmp(&a), std::cmp::Ordering::Equal);
    }
}
