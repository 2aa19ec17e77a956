use crate::service::{TransportError, TransportResult};

use super::buffer::FrameBuffer;

/// Width of the length prefix on the wire.
pub(crate) const LENGTH_FIELD_LEN: usize = 4;

/// Encode `payload` as a length-prefixed frame into `buf`.
///
/// An oversized payload is rejected before anything is staged, so the caller
/// performs no I/O in that case. The length field is a `u32` in native byte
/// order; both ends of a link are peers of this same transport.
pub(crate) fn encode(payload: &[u8], limit: usize, buf: &mut FrameBuffer) -> TransportResult<()> {
    if payload.len() > limit {
        return Err(TransportError::MessageSizeTooLarge {
            size: payload.len(),
            limit,
        });
    }
    buf.allocate(LENGTH_FIELD_LEN + payload.len());
    let frame = buf.as_mut_slice();
    frame[..LENGTH_FIELD_LEN].copy_from_slice(&(payload.len() as u32).to_ne_bytes());
    frame[LENGTH_FIELD_LEN..].copy_from_slice(payload);
    Ok(())
}

/// Interpret a length field read off the wire.
pub(crate) fn decode_len(header: &[u8], limit: usize) -> TransportResult<usize> {
    let bytes: [u8; LENGTH_FIELD_LEN] = header.try_into().map_err(|_| {
        TransportError::ReceiveFailure(format!(
            "length field is {} bytes, expected {}",
            header.len(),
            LENGTH_FIELD_LEN
        ))
    })?;
    let len = u32::from_ne_bytes(bytes) as usize;
    if len > limit {
        return Err(TransportError::ReceiveFailure(format!(
            "frame of length {} is too large",
            len
        )));
    }
    Ok(len)
}
