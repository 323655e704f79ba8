use chrono::{DateTime, Utc};
use std::fmt;

use crate::proto::conv::exponent_decimals;
use crate::rawpacket::{PacketError, RawPacket};

/// Magnitude the meter reports when the input is out of range.
pub const OVERFLOW_VALUE: f64 = 9.9e37;

/// Unit, display label and the decimal exponent for every range of one
/// main mode.
#[derive(Debug, PartialEq, Eq)]
pub struct ModeRange {
    pub unit: &'static str,
    pub label: &'static str,
    pub exponents: &'static [i8],
}

impl ModeRange {
    pub fn exponent(&self, range: u8) -> Option<i8> {
        self.exponents.get(usize::from(range)).copied()
    }
}

const fn mode(unit: &'static str, label: &'static str, exponents: &'static [i8]) -> ModeRange {
    ModeRange {
        unit,
        label,
        exponents,
    }
}

/// Main modes of the 121GW, indexed by the 5 bit mode field.
pub static MODE_RANGE_TABLE: [ModeRange; 25] = [
    mode("V", "Voltage Low Z (V)", &[-1]),                        // 0
    mode("V", "Voltage DC (V)", &[-4, -3, -2, -1]),               // 1
    mode("V", "Voltage AC (V)", &[-4, -3, -2, -1]),               // 2
    mode("mV", "Voltage DC (mV)", &[-6, -5]),                     // 3
    mode("mV", "Voltage AC (mV)", &[-6, -5]),                     // 4
    mode("°C", "Temp (°C)", &[-1]),                               // 5
    mode("Hz", "Frequency (Hz)", &[-3, -2, -1, 0, 1]),            // 6
    mode("s", "Period (s)", &[-4, -3, -2]),                       // 7
    mode("%", "Duty (%)", &[-1]),                                 // 8
    mode("Ω", "Resistance (Ω)", &[-3, -2, -1, 0, 1, 2, 3]),       // 9
    mode("Ω", "Continuity (Ω)", &[-2]),                           // 10
    mode("V", "Diode (V)", &[-4, -3]),                            // 11
    mode("F", "Capacitance (F)", &[-12, -11, -10, -9, -8, -6]),   // 12
    mode("uVA", "Power AC (uVA)", &[-8, -7, -7, -6]),             // 13
    mode("mVA", "Power AC (mVA)", &[-6, -5, -5, -4]),             // 14
    mode("VA", "Power AC (VA)", &[-4, -3, -3, -2]),               // 15
    mode("uA", "Current AC (uA)", &[-9, -8]),                     // 16
    mode("uA", "Current DC (uA)", &[-9, -8]),                     // 17
    mode("mA", "Current AC (mA)", &[-7, -6]),                     // 18
    mode("mA", "Current DC (mA)", &[-7, -6]),                     // 19
    mode("A", "Current AC (A)", &[-5, -4, -3]),                   // 20
    mode("A", "Current DC (A)", &[-5, -4, -3]),                   // 21
    mode("uVA", "Power DC (uVA)", &[-8, -7, -7, -6]),             // 22
    mode("mVA", "Power DC (mVA)", &[-6, -5, -5, -4]),             // 23
    mode("VA", "Power DC (VA)", &[-4, -3, -3, -2]),               // 24
];

pub fn mode_range(mode: u8) -> Option<&'static ModeRange> {
    MODE_RANGE_TABLE.get(usize::from(mode))
}

/// Main display value of one packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Index into [`MODE_RANGE_TABLE`].
    pub mode: u8,
    /// Short unit, e.g. `V`.
    pub unit: &'static str,
    /// Long mode name, e.g. `Voltage DC (V)`.
    pub label: &'static str,
    /// Decimal exponent of the active range.
    pub range: i8,
    /// Measured value, `±`[`OVERFLOW_VALUE`] on overflow.
    pub value: f64,
    pub overflow: bool,
    /// Host time the packet was decoded.
    pub ts: DateTime<Utc>,
}

impl TryFrom<(&RawPacket, DateTime<Utc>)> for Reading {
    type Error = PacketError;

    fn try_from(value: (&RawPacket, DateTime<Utc>)) -> std::result::Result<Self, Self::Error> {
        let (raw, ts) = value;
        let mode = mode_range(raw.main_mode).ok_or(PacketError::UnknownMode(raw.main_mode))?;
        let range = mode
            .exponent(raw.main_range)
            .ok_or(PacketError::UnknownRange {
                mode: raw.main_mode,
                range: raw.main_range,
            })?;

        let sign = if raw.main_negative { -1.0 } else { 1.0 };
        let value = if raw.main_overflow {
            OVERFLOW_VALUE * sign
        } else {
            f64::from(raw.main_value) * sign * 10_f64.powi(i32::from(range))
        };

        Ok(Reading {
            mode: raw.main_mode,
            unit: mode.unit,
            label: mode.label,
            range,
            value,
            overflow: raw.main_overflow,
            ts,
        })
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.overflow {
            write!(f, "{}OFL {}", if self.value < 0.0 { "-" } else { "" }, self.unit)
        } else {
            write!(
                f,
                "{:.*} {}",
                exponent_decimals(self.range),
                self.value,
                self.unit
            )
        }
    }
}
