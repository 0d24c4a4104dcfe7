// SPDX-License-Identifier: Apache-2.0

//! In-place views over Ethernet II / IPv4 / TCP-UDP frames.
//!
//! The datapath rewrites addresses and ports directly in the receive
//! buffer, so headers are accessed through [`FrameView`], a borrow of the
//! frame bytes with the transport offset resolved once at parse time.
//! Nothing deeper than the base TCP/UDP header is ever interpreted.

#[cfg(any(doc, test, feature = "test_buffer"))]
pub mod test_utils;

use crate::checksum;
use crate::eth::mac::Mac;
use std::net::Ipv4Addr;

/// Length of an Ethernet II header.
pub const ETH_HDR_LEN: usize = 14;
/// The ethertype of IPv4.
pub const ETHERTYPE_IPV4: u16 = 0x0800;
/// Length of an IPv4 header without options.
pub const IPV4_MIN_HDR_LEN: usize = 20;

/// The transport protocols the datapath translates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransProto {
    /// TCP (IP protocol 6)
    Tcp,
    /// UDP (IP protocol 17)
    Udp,
}

impl TransProto {
    /// The IP next-protocol number of this protocol.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            TransProto::Tcp => 6,
            TransProto::Udp => 17,
        }
    }

    /// Map an IP next-protocol number to a [`TransProto`].
    #[must_use]
    pub const fn from_number(number: u8) -> Option<TransProto> {
        match number {
            6 => Some(TransProto::Tcp),
            17 => Some(TransProto::Udp),
            _ => None,
        }
    }

    /// Length of the base header (the part the datapath requires).
    pub(crate) const fn min_header_len(self) -> usize {
        match self {
            TransProto::Tcp => 20,
            TransProto::Udp => 8,
        }
    }

    /// Offset of the checksum field within the transport header.
    const fn checksum_offset(self) -> usize {
        match self {
            TransProto::Tcp => 16,
            TransProto::Udp => 6,
        }
    }
}

impl std::fmt::Display for TransProto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransProto::Tcp => write!(f, "tcp"),
            TransProto::Udp => write!(f, "udp"),
        }
    }
}

/// Errors which can occur while parsing a frame.
///
/// Every variant is a runtime-soft condition: the offending packet is
/// dropped and processing continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The buffer is too short for the headers it claims to carry.
    #[error("frame too short ({0} octets)")]
    Truncated(usize),
    /// The ethertype is not IPv4.
    #[error("unhandled ethertype {0:#06x}")]
    NotIpv4(u16),
    /// The IP version nibble is not 4.
    #[error("unhandled IP version {0}")]
    BadVersion(u8),
    /// The IPv4 header length field is below the minimum.
    #[error("bad IPv4 header length ({0} octets)")]
    BadHeaderLength(usize),
    /// The IP next-protocol is neither TCP nor UDP.
    #[error("unhandled IP protocol {0}")]
    UnhandledProtocol(u8),
}

/// A mutable view over a parsed Ethernet II + IPv4 + TCP/UDP frame.
///
/// Offsets are resolved once by [`FrameView::parse`]; all accessors are
/// plain loads and stores on the underlying buffer.
#[derive(Debug)]
pub struct FrameView<'a> {
    data: &'a mut [u8],
    l4: usize,
    proto: TransProto,
}

impl<'a> FrameView<'a> {
    /// Parse a frame, resolving the transport header offset.
    ///
    /// IPv4 header checksums are not validated on ingress and options are
    /// skipped, not interpreted.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] if the frame is not a well-formed
    /// TCP-or-UDP-in-IPv4 Ethernet II frame.
    pub fn parse(data: &'a mut [u8]) -> Result<FrameView<'a>, FrameError> {
        if data.len() < ETH_HDR_LEN + IPV4_MIN_HDR_LEN {
            return Err(FrameError::Truncated(data.len()));
        }
        let ethertype = u16::from_be_bytes([data[12], data[13]]);
        if ethertype != ETHERTYPE_IPV4 {
            return Err(FrameError::NotIpv4(ethertype));
        }
        let version = data[ETH_HDR_LEN] >> 4;
        if version != 4 {
            return Err(FrameError::BadVersion(version));
        }
        let header_len = usize::from(data[ETH_HDR_LEN] & 0x0f) * 4;
        if header_len < IPV4_MIN_HDR_LEN {
            return Err(FrameError::BadHeaderLength(header_len));
        }
        let proto_number = data[ETH_HDR_LEN + 9];
        let proto = TransProto::from_number(proto_number)
            .ok_or(FrameError::UnhandledProtocol(proto_number))?;
        let l4 = ETH_HDR_LEN + header_len;
        if data.len() < l4 + proto.min_header_len() {
            return Err(FrameError::Truncated(data.len()));
        }
        Ok(FrameView { data, l4, proto })
    }

    /// The transport protocol of the frame.
    #[must_use]
    pub fn protocol(&self) -> TransProto {
        self.proto
    }

    fn mac_at(&self, off: usize) -> Mac {
        Mac([
            self.data[off],
            self.data[off + 1],
            self.data[off + 2],
            self.data[off + 3],
            self.data[off + 4],
            self.data[off + 5],
        ])
    }

    /// The Ethernet destination address.
    #[must_use]
    pub fn eth_destination(&self) -> Mac {
        self.mac_at(0)
    }

    /// The Ethernet source address.
    #[must_use]
    pub fn eth_source(&self) -> Mac {
        self.mac_at(6)
    }

    /// Set the Ethernet destination address.
    pub fn set_eth_destination(&mut self, mac: Mac) {
        self.data[0..6].copy_from_slice(mac.as_ref());
    }

    /// Set the Ethernet source address.
    pub fn set_eth_source(&mut self, mac: Mac) {
        self.data[6..12].copy_from_slice(mac.as_ref());
    }

    /// The IPv4 source address.
    #[must_use]
    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.data[ETH_HDR_LEN + 12],
            self.data[ETH_HDR_LEN + 13],
            self.data[ETH_HDR_LEN + 14],
            self.data[ETH_HDR_LEN + 15],
        )
    }

    /// The IPv4 destination address.
    #[must_use]
    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.data[ETH_HDR_LEN + 16],
            self.data[ETH_HDR_LEN + 17],
            self.data[ETH_HDR_LEN + 18],
            self.data[ETH_HDR_LEN + 19],
        )
    }

    /// Set the IPv4 source address.
    pub fn set_src_addr(&mut self, addr: Ipv4Addr) {
        self.data[ETH_HDR_LEN + 12..ETH_HDR_LEN + 16].copy_from_slice(&addr.octets());
    }

    /// Set the IPv4 destination address.
    pub fn set_dst_addr(&mut self, addr: Ipv4Addr) {
        self.data[ETH_HDR_LEN + 16..ETH_HDR_LEN + 20].copy_from_slice(&addr.octets());
    }

    fn u16_at(&self, off: usize) -> u16 {
        u16::from_be_bytes([self.data[off], self.data[off + 1]])
    }

    fn put_u16(&mut self, off: usize, value: u16) {
        self.data[off..off + 2].copy_from_slice(&value.to_be_bytes());
    }

    /// The IPv4 total length field.
    #[must_use]
    pub fn total_len(&self) -> u16 {
        self.u16_at(ETH_HDR_LEN + 2)
    }

    /// The transport source port.
    #[must_use]
    pub fn src_port(&self) -> u16 {
        self.u16_at(self.l4)
    }

    /// The transport destination port.
    #[must_use]
    pub fn dst_port(&self) -> u16 {
        self.u16_at(self.l4 + 2)
    }

    /// Set the transport source port.
    pub fn set_src_port(&mut self, port: u16) {
        self.put_u16(self.l4, port);
    }

    /// Set the transport destination port.
    pub fn set_dst_port(&mut self, port: u16) {
        self.put_u16(self.l4 + 2, port);
    }

    /// The stored IPv4 header checksum.
    #[must_use]
    pub fn ipv4_checksum(&self) -> u16 {
        self.u16_at(ETH_HDR_LEN + 10)
    }

    /// The stored transport checksum.
    #[must_use]
    pub fn transport_checksum(&self) -> u16 {
        self.u16_at(self.l4 + self.proto.checksum_offset())
    }

    /// Compute the IPv4 header checksum from the current header contents.
    #[must_use]
    pub fn compute_ipv4_checksum(&self) -> u16 {
        checksum::ipv4_header(&self.data[ETH_HDR_LEN..self.l4])
    }

    /// Recompute and store the IPv4 header checksum.
    pub fn update_ipv4_checksum(&mut self) {
        let value = self.compute_ipv4_checksum();
        self.put_u16(ETH_HDR_LEN + 10, value);
    }

    /// Octets covered by the transport checksum, bounded by the IPv4 total
    /// length so that link-layer padding never leaks into the sum.
    fn transport_len(&self) -> usize {
        let header_len = self.l4 - ETH_HDR_LEN;
        let declared = usize::from(self.total_len()).saturating_sub(header_len);
        let available = self.data.len() - self.l4;
        declared.clamp(self.proto.min_header_len(), available)
    }

    /// Compute the transport checksum as it would go on the wire: the
    /// one's-complement sum over the pseudo header, transport header and
    /// payload (checksum field as zero), with a computed UDP checksum of
    /// zero substituted by `0xffff`.
    #[must_use]
    pub fn compute_transport_checksum(&self) -> u16 {
        let transport_len = self.transport_len();
        #[allow(clippy::cast_possible_truncation)] // bounded by the IPv4 total length field
        let mut sum = checksum::pseudo_header(
            self.src_addr().octets(),
            self.dst_addr().octets(),
            self.proto.number(),
            transport_len as u16,
        );
        let transport = &self.data[self.l4..self.l4 + transport_len];
        let skip = self.proto.checksum_offset();
        sum = checksum::add_words(sum, &transport[..skip]);
        sum = checksum::add_words(sum, &transport[skip + 2..]);
        let value = checksum::finish(sum);
        if self.proto == TransProto::Udp && value == 0 {
            0xffff
        } else {
            value
        }
    }

    /// Recompute and store the transport checksum.
    pub fn update_transport_checksum(&mut self) {
        let value = self.compute_transport_checksum();
        let off = self.l4 + self.proto.checksum_offset();
        self.put_u16(off, value);
    }

    /// Whether the stored IPv4 header checksum matches the header.
    #[must_use]
    pub fn ipv4_checksum_valid(&self) -> bool {
        self.ipv4_checksum() == self.compute_ipv4_checksum()
    }

    /// Whether the stored transport checksum matches the frame contents.
    #[must_use]
    pub fn transport_checksum_valid(&self) -> bool {
        self.transport_checksum() == self.compute_transport_checksum()
    }
}

/// Rewrite the Ethernet source and destination addresses of `frame` in
/// place without parsing anything above the link layer.
///
/// Returns `false` (leaving the frame untouched) when the buffer is too
/// short to carry an Ethernet header.
pub fn rewrite_l2(frame: &mut [u8], source: Mac, destination: Mac) -> bool {
    if frame.len() < ETH_HDR_LEN {
        return false;
    }
    frame[0..6].copy_from_slice(destination.as_ref());
    frame[6..12].copy_from_slice(source.as_ref());
    true
}
