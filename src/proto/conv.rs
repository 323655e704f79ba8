use chrono::{DateTime, Local, Utc};

/// Number of decimals shown for a value in the given range.
pub fn exponent_decimals(exponent: i8) -> usize {
    if exponent < 0 {
        usize::from(exponent.unsigned_abs())
    } else {
        0
    }
}

pub fn pretty_ts(&ts: &DateTime<Utc>) -> String {
    let local: DateTime<Local> = ts.into();
    local.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}
