use bytes::{Bytes, BytesMut};

/// Scratch storage for one frame, in either direction.
///
/// The engine runs at most one I/O operation per connection at a time, so a
/// single buffer carries both the outgoing frame and the incoming one.
/// `allocate` resizes to the exact operation size instead of growing the
/// buffer incrementally across reads.
#[derive(Debug, Default)]
pub(crate) struct FrameBuffer {
    inner: BytesMut,
}

impl FrameBuffer {
    pub(crate) fn new() -> FrameBuffer {
        FrameBuffer {
            inner: BytesMut::new(),
        }
    }

    /// Discard previous contents and resize to exactly `len` zeroed bytes.
    pub(crate) fn allocate(&mut self, len: usize) {
        self.inner.clear();
        self.inner.resize(len, 0);
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.inner
    }

    /// Freeze the received frame for dispatch, leaving the buffer empty.
    pub(crate) fn split_payload(&mut self) -> Bytes {
        self.inner.split().freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_discards_previous_contents() {
        let mut buffer = FrameBuffer::new();
        buffer.allocate(4);
        buffer.as_mut_slice().copy_from_slice(b"PING");

        buffer.allocate(2);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.as_slice(), &[0, 0]);
    }

    #[test]
    fn split_payload_leaves_buffer_empty() {
        let mut buffer = FrameBuffer::new();
        buffer.allocate(4);
        buffer.as_mut_slice().copy_from_slice(b"PONG");

        let payload = buffer.split_payload();
        assert_eq!(&payload[..], b"PONG");
        assert_eq!(buffer.len(), 0);
    }
}
