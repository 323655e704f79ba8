use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::Decoder;

use super::frame::{Frame, FRAME_LEN, START_MARKER};

/// Cuts the 121GW notification stream into frames.
///
/// The meter streams packets back to back, but BLE delivers them in chunks
/// of arbitrary size. A frame starts at a `0xF2` byte seen while scanning
/// and ends after [`FRAME_LEN`] bytes. The marker value inside a payload
/// has no meaning, so a desynchronized stream produces garbage frames which
/// the checksum check filters out later.
#[derive(Debug)]
pub struct FrameCodec {
    waiting_for_start: bool,
    buffer: BytesMut,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            waiting_for_start: true,
            buffer: BytesMut::with_capacity(FRAME_LEN),
        }
    }
}

impl FrameCodec {
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        if self.waiting_for_start {
            if byte == START_MARKER {
                self.buffer.put_u8(byte);
                self.waiting_for_start = false;
            }
            return None;
        }

        self.buffer.put_u8(byte);

        if self.buffer.len() >= FRAME_LEN {
            let frame = Frame::try_from(&self.buffer[..]).ok();
            self.reset();
            return frame;
        }
        None
    }

    /// Feeds one notification chunk, returning the frames it completed.
    pub fn on_bytes(&mut self, chunk: impl AsRef<[u8]>) -> Vec<Frame> {
        chunk
            .as_ref()
            .iter()
            .filter_map(|b| self.push(*b))
            .collect()
    }

    /// Drops a partially received frame and scans for the next marker.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.waiting_for_start = true;
    }

    pub fn is_waiting_for_start(&self) -> bool {
        self.waiting_for_start
    }

    /// Bytes collected for the frame in progress.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    // Framing never fails: stray bytes are skipped and bad frames are left
    // to the checksum check, so io::Error only comes from the transport.
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while src.has_remaining() {
            if let Some(frame) = self.push(src.get_u8()) {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }
}
