//!
//! This library provides communication with an EEVBlog 121GW digital multimeter
//! over Bluetooth LE.
//!
//! <br>
//!
//! # Details
//!
//! - Bluetooth has to be switched on at the meter (hold the `1ms PEAK` button
//!   while powering on).
//!
//! - The meter streams its display as 19 byte packets. Packets are reassembled,
//!   checked and decoded in the background. Damaged packets are skipped.
//!
//! - Basic setup and reading
//!
//!   ```no_run
//!   use gw121ctrl::{ConnectOptions, Device};
//!   #[tokio::main]
//!   async fn main() -> gw121ctrl::Result<()> {
//!       let mut device = Device::connect(&ConnectOptions::default()).await?;
//!       let reading = device.reading().await?;
//!       println!("{}: {}", reading.label, reading);
//!       device.close().await
//!   }
//!   ```
//!
//! # Supported devices
//!
//!  * EEVBlog 121GW
//!

use std::time::Duration;

pub mod decoder;
pub mod device;
pub mod measurement;
pub mod proto;
pub mod rawpacket;

pub use device::{ConnectOptions, ConnectTarget, Device};
pub use measurement::Reading;
pub use proto::Result;

/// Advertised name of the 121GW.
pub const DEFAULT_DEVICE_NAME: &str = "121GW";

/// How long to scan for advertising peripherals before connecting.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(5);

/// How long [`Device::reading`] waits for the next packet.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);
