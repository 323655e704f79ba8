use std::{fmt, io, ops::Index};

/// Every 121GW packet is exactly this long, marker and checksum included.
pub const FRAME_LEN: usize = 19;

/// First byte of every packet.
pub const START_MARKER: u8 = 0xF2;

pub(crate) const CHECKSUM_POS: usize = FRAME_LEN - 1;

/// One complete packet as cut out of the notification stream.
///
/// A frame is not necessarily valid: the reassembler only knows about the
/// marker and the length, the checksum is checked by the decoder.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    pub fn new(data: [u8; FRAME_LEN]) -> Self {
        Self(data)
    }

    /// XOR over bytes 0-17.
    pub fn checksum(&self) -> u8 {
        self.0[..CHECKSUM_POS].iter().fold(0, |acc, b| acc ^ b)
    }

    pub fn is_valid(&self) -> bool {
        self.checksum() == self.0[CHECKSUM_POS]
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }
}

impl Index<usize> for Frame {
    type Output = u8;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl TryFrom<&[u8]> for Frame {
    type Error = io::Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        <[u8; FRAME_LEN]>::try_from(value)
            .map(Self)
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Frame must be {} bytes, got {}", FRAME_LEN, value.len()),
                )
            })
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:02x?})", self.0)
    }
}

/// Builds a frame with a correct checksum around the given payload.
#[cfg(test)]
pub(crate) fn frame_with_payload(payload: [u8; FRAME_LEN - 2]) -> Frame {
    let mut data = [0_u8; FRAME_LEN];
    data[0] = START_MARKER;
    data[1..CHECKSUM_POS].copy_from_slice(&payload);
    let mut frame = Frame(data);
    frame.0[CHECKSUM_POS] = frame.checksum();
    frame
}
