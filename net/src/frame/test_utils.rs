// SPDX-License-Identifier: Apache-2.0

//! Builders producing well-formed test frames.

use crate::buffer::TestBuffer;
use crate::eth::mac::Mac;
use crate::frame::{ETH_HDR_LEN, ETHERTYPE_IPV4, FrameView, IPV4_MIN_HDR_LEN, TransProto};
use std::net::Ipv4Addr;

/// Build a TCP-in-IPv4 Ethernet frame with valid checksums.
#[must_use]
pub fn build_tcp_frame(
    src_mac: Mac,
    dst_mac: Mac,
    src: (Ipv4Addr, u16),
    dst: (Ipv4Addr, u16),
    payload: &[u8],
) -> TestBuffer {
    build_frame(TransProto::Tcp, src_mac, dst_mac, src, dst, payload)
}

/// Build a UDP-in-IPv4 Ethernet frame with valid checksums.
#[must_use]
pub fn build_udp_frame(
    src_mac: Mac,
    dst_mac: Mac,
    src: (Ipv4Addr, u16),
    dst: (Ipv4Addr, u16),
    payload: &[u8],
) -> TestBuffer {
    build_frame(TransProto::Udp, src_mac, dst_mac, src, dst, payload)
}

/// Build a frame of the given transport protocol with valid checksums.
///
/// # Panics
///
/// Panics if the assembled frame does not fit the IPv4 length field.
#[must_use]
pub fn build_frame(
    protocol: TransProto,
    src_mac: Mac,
    dst_mac: Mac,
    src: (Ipv4Addr, u16),
    dst: (Ipv4Addr, u16),
    payload: &[u8],
) -> TestBuffer {
    let transport_len = protocol.min_header_len() + payload.len();
    let total_len =
        u16::try_from(IPV4_MIN_HDR_LEN + transport_len).expect("frame exceeds the IPv4 length field");

    let mut frame = Vec::with_capacity(ETH_HDR_LEN + usize::from(total_len));

    // Ethernet II
    frame.extend_from_slice(dst_mac.as_ref());
    frame.extend_from_slice(src_mac.as_ref());
    frame.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());

    // IPv4, no options
    frame.push(0x45);
    frame.push(0x00);
    frame.extend_from_slice(&total_len.to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x00]); // identification
    frame.extend_from_slice(&[0x00, 0x00]); // flags and fragment offset
    frame.push(64); // ttl
    frame.push(protocol.number());
    frame.extend_from_slice(&[0x00, 0x00]); // header checksum, filled below
    frame.extend_from_slice(&src.0.octets());
    frame.extend_from_slice(&dst.0.octets());

    // Transport base header
    frame.extend_from_slice(&src.1.to_be_bytes());
    frame.extend_from_slice(&dst.1.to_be_bytes());
    match protocol {
        TransProto::Tcp => {
            frame.extend_from_slice(&0u32.to_be_bytes()); // sequence number
            frame.extend_from_slice(&0u32.to_be_bytes()); // acknowledgment number
            frame.push(0x50); // data offset
            frame.push(0x10); // ACK
            frame.extend_from_slice(&0xffffu16.to_be_bytes()); // window
            frame.extend_from_slice(&[0x00, 0x00]); // checksum, filled below
            frame.extend_from_slice(&[0x00, 0x00]); // urgent pointer
        }
        TransProto::Udp => {
            let udp_len = u16::try_from(transport_len).expect("frame exceeds the UDP length field");
            frame.extend_from_slice(&udp_len.to_be_bytes());
            frame.extend_from_slice(&[0x00, 0x00]); // checksum, filled below
        }
    }

    frame.extend_from_slice(payload);

    let mut view = FrameView::parse(&mut frame).expect("built frame must parse");
    view.update_ipv4_checksum();
    view.update_transport_checksum();

    TestBuffer::from_raw_data(&frame)
}
