//! Local-socket frame codec
//!
//! JSON-RPC messages over the local socket transport are length-prefixed:
//!
//! ```text
//! +------------------+------------------+
//! | Length (4 bytes) | JSON payload     |
//! +------------------+------------------+
//! ```
//!
//! The length is an unsigned big-endian integer counting payload bytes only.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FreezerError;

/// Maximum frame size (64MB). A full block chunk range request stays well
/// below this.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = FreezerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }

        let length = (&src[..4]).get_u32() as usize;
        if length > self.max_frame_size {
            return Err(FreezerError::Transport(format!(
                "frame size {} exceeds maximum {}",
                length, self.max_frame_size
            )));
        }

        let total_length = 4 + length;
        if src.len() < total_length {
            src.reserve(total_length - src.len());
            return Ok(None);
        }

        src.advance(4);
        Ok(Some(src.split_to(length)))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FreezerError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let length = item.len();
        if length > self.max_frame_size {
            return Err(FreezerError::Transport(format!(
                "frame size {} exceeds maximum {}",
                length, self.max_frame_size
            )));
        }

        dst.reserve(4 + length);
        dst.put_u32(length as u32);
        dst.extend_from_slice(&item);
        Ok(())
    }
}
