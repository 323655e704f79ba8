use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use crate::proto::frame::{Frame, CHECKSUM_POS};

/// Reasons a frame does not produce a reading.
///
/// These are expected on a radio link and never reach the caller, the
/// decoder logs them and waits for the next frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Checksum mismatch: calculated {calculated:#04x}, received {received:#04x}")]
    Checksum { calculated: u8, received: u8 },
    #[error("Unknown main mode {}", _0)]
    UnknownMode(u8),
    #[error("Unknown range {range} for main mode {mode}")]
    UnknownRange { mode: u8, range: u8 },
}

/// Packet fields as the meter encodes them, before any table lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub serial: [u8; 4],
    pub main_mode: u8,
    pub main_range: u8,
    pub main_negative: bool,
    pub main_overflow: bool,
    /// 18 bit magnitude.
    pub main_value: u32,
    pub sub_mode: u8,
    pub sub_range: u8,
    pub sub_value: u16,
    pub bar_status: u8,
    pub bar_value: u8,
    pub icon_status: [u8; 3],
}

impl TryFrom<&Frame> for RawPacket {
    type Error = PacketError;

    fn try_from(frame: &Frame) -> std::result::Result<Self, Self::Error> {
        if !frame.is_valid() {
            return Err(PacketError::Checksum {
                calculated: frame.checksum(),
                received: frame[CHECKSUM_POS],
            });
        }

        let data = frame.as_bytes();

        // Bits 7-6 of byte 5 are bits 17-16 of the main value.
        let main_value = ((u32::from(data[5]) << 10) & 0x03_0000)
            | u32::from(BigEndian::read_u16(&data[7..9]));

        Ok(RawPacket {
            serial: [data[1], data[2], data[3], data[4]],
            main_mode: data[5] & 0x1F,
            main_range: data[6] & 0x0F,
            main_negative: (data[6] >> 6) & 0x01 == 1,
            main_overflow: (data[6] >> 7) & 0x01 == 1,
            main_value,
            sub_mode: data[9],
            sub_range: data[10] & 0x07,
            sub_value: BigEndian::read_u16(&data[11..13]),
            bar_status: data[13],
            bar_value: data[14] & 0x1F,
            icon_status: [data[15], data[16], data[17]],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::frame::frame_with_payload;

    #[test]
    fn main_fields() {
        let frame = frame_with_payload([
            0x01, 0x02, 0x03, 0x04, // serial
            0x01, 0x03, // mode 1, range 3
            0x30, 0x39, // 12345
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ]);
        let raw = RawPacket::try_from(&frame).expect("valid packet");
        assert_eq!(raw.serial, [1, 2, 3, 4]);
        assert_eq!(raw.main_mode, 1);
        assert_eq!(raw.main_range, 3);
        assert!(!raw.main_negative);
        assert!(!raw.main_overflow);
        assert_eq!(raw.main_value, 12345);
    }

    #[test]
    fn mode_byte_carries_top_value_bits() {
        // 0xE3: mode 3 in bits 4-0, value bits 17-16 in bits 7-6
        let frame = frame_with_payload([
            0x00, 0x00, 0x00, 0x00, 0xE3, 0x01, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00,
        ]);
        let raw = RawPacket::try_from(&frame).expect("valid packet");
        assert_eq!(raw.main_mode, 3);
        assert_eq!(raw.main_value, 262143);
    }

    #[test]
    fn sign_and_overflow_bits() {
        let frame = frame_with_payload([
            0x00, 0x00, 0x00, 0x00, 0x01, 0xC2, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00,
        ]);
        let raw = RawPacket::try_from(&frame).expect("valid packet");
        assert!(raw.main_negative);
        assert!(raw.main_overflow);
        assert_eq!(raw.main_range, 2);
    }

    #[test]
    fn reserved_fields() {
        let frame = frame_with_payload([
            0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, // main
            0x05, 0xFA, 0x12, 0x34, // sub mode, range, value
            0xA5, 0xFF, // bar
            0x01, 0x02, 0x03, // icons
        ]);
        let raw = RawPacket::try_from(&frame).expect("valid packet");
        assert_eq!(raw.sub_mode, 5);
        assert_eq!(raw.sub_range, 2);
        assert_eq!(raw.sub_value, 0x1234);
        assert_eq!(raw.bar_status, 0xA5);
        assert_eq!(raw.bar_value, 0x1F);
        assert_eq!(raw.icon_status, [1, 2, 3]);
    }

    #[test]
    fn checksum_mismatch() {
        let mut data = *frame_with_payload([0x00; 17]).as_bytes();
        data[8] ^= 0x40;
        let frame = Frame::new(data);
        assert!(matches!(
            RawPacket::try_from(&frame),
            Err(PacketError::Checksum { .. })
        ));
    }
}
