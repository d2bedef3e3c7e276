//! Error types for Sparsha

use crate::core::types::SensorStatus;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Sparsha error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport unreachable or device not found
    #[error("Connection failed for {device_id}: {reason}")]
    Connection {
        /// Device that failed to connect
        device_id: String,
        /// Underlying cause
        reason: String,
    },

    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame from a device
    #[error("Parse error: {0}")]
    Parse(String),

    /// Operation not permitted in the driver's current state
    #[error("Cannot {operation} while {status}")]
    InvalidState {
        /// Rejected operation
        operation: &'static str,
        /// Status at the time of the call
        status: SensorStatus,
    },

    /// Transport not open
    #[error("Device not connected")]
    NotConnected,

    /// Unknown connection type in configuration
    #[error("Unsupported connection type: {0}")]
    UnsupportedConnection(String),

    /// Unknown data format in configuration
    #[error("Unsupported data format: {0}")]
    UnsupportedFormat(String),

    /// Configuration rejected during validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Device id not present in the registry
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Worker thread could not be started
    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The peer or device is gone; retrying the same handle cannot succeed
    pub fn is_link_lost(&self) -> bool {
        use std::io::ErrorKind;
        let kind = match self {
            Error::Io(e) => e.kind(),
            Error::Serial(e) => match e.kind() {
                serialport::ErrorKind::NoDevice => return true,
                serialport::ErrorKind::Io(kind) => kind,
                _ => return false,
            },
            _ => return false,
        };
        matches!(
            kind,
            ErrorKind::UnexpectedEof
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::NotConnected
        )
    }
}
