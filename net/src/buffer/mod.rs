// SPDX-License-Identifier: Apache-2.0

//! [`PacketBuffer`] and related traits.

#[cfg(any(doc, test, feature = "test_buffer"))]
pub mod test_buffer;

use core::fmt::Debug;

#[allow(unused_imports)] // re-export
#[cfg(any(doc, test, feature = "test_buffer"))]
pub use test_buffer::TestBuffer;

/// Super trait representing the abstract operations which may be performed on a packet buffer.
pub trait PacketBuffer: AsRef<[u8]> + Debug + 'static {}
impl<T> PacketBuffer for T where T: AsRef<[u8]> + Debug + 'static {}

/// Super trait representing the abstract operations which may be performed on a mutable packet
/// buffer.
///
/// Dropping a buffer frees it; a buffer handed to the engine is consumed
/// either by a transmit sink or by drop.
pub trait PacketBufferMut: PacketBuffer + AsMut<[u8]> + Send {}
impl<T> PacketBufferMut for T where T: PacketBuffer + AsMut<[u8]> + Send {}
