// SPDX-License-Identifier: Apache-2.0

//! Simple owned implementation of [`PacketBuffer`] used by tests and by the
//! kernel driver.

use tracing::trace;

// only included for doc ref
#[cfg(doc)]
use crate::buffer::PacketBuffer;

/// An owned, fixed-content packet buffer backed by a `Vec<u8>`.
///
/// The engine never resizes frames, so the buffer exposes exactly the
/// octets it was created with.
#[derive(Debug, Clone)]
pub struct TestBuffer {
    buffer: Vec<u8>,
}

impl Drop for TestBuffer {
    fn drop(&mut self) {
        trace!("Dropping TestBuffer");
    }
}

impl TestBuffer {
    /// The maximum capacity of a `TestBuffer`, matching the default
    /// capacity of a hardware receive buffer.
    pub const CAPACITY: usize = 2048;

    /// Create a new `TestBuffer` holding a copy of the given octets.
    #[must_use]
    pub fn from_raw_data(data: &[u8]) -> TestBuffer {
        let mut buffer = Vec::with_capacity(TestBuffer::CAPACITY);
        buffer.extend_from_slice(data);
        TestBuffer { buffer }
    }
}

impl AsRef<[u8]> for TestBuffer {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_slice()
    }
}

impl AsMut<[u8]> for TestBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        self.buffer.as_mut_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::TestBuffer;

    #[test]
    fn test_buffer_round_trip() {
        let data = [0xde, 0xad, 0xbe, 0xef];
        let mut buf = TestBuffer::from_raw_data(&data);
        assert_eq!(buf.as_ref(), &data);
        buf.as_mut()[0] = 0x00;
        assert_eq!(buf.as_ref(), &[0x00, 0xad, 0xbe, 0xef]);
    }
}
