use std::time::Duration;

pub mod codec;
pub mod conv;
pub mod frame;

#[cfg(test)]
pub mod fake;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("I/O error: {:?}", _0)]
    Io(#[from] std::io::Error),

    #[error("Bluetooth error: {:?}", _0)]
    Ble(#[from] btleplug::Error),

    #[error("No Bluetooth adapter found")]
    NoAdapter,
    #[error("Device {} not found", _0)]
    DeviceNotFound(String),
    #[error("Failed to connect to {}", _0)]
    ConnectFailed(String),
    #[error("Measurement characteristic not found on device")]
    CharacteristicNotFound,
    #[error("No reading received within {:?}", _0)]
    ReadTimeout(Duration),
    #[error("Connection was closed")]
    Abort,
}

impl ProtoError {
    /// True for failures while discovering or connecting to the meter.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Ble(_)
                | Self::NoAdapter
                | Self::DeviceNotFound(_)
                | Self::ConnectFailed(_)
                | Self::CharacteristicNotFound
        )
    }
}

pub type Result<T> = std::result::Result<T, ProtoError>;
