//! SparshaIO - Multi-transport sensor acquisition library
//!
//! Connects to tactile and physiological sensors over serial, Bluetooth,
//! WiFi/TCP or an in-process generator, normalizes their output into
//! quality-assessed [`SensorReading`]s and fans them out to consumers.
//!
//! ## Layers
//!
//! - [`transport`]: byte-level I/O (serial port, TCP socket, in-memory mock)
//! - [`codec`]: wire formats and stream framing
//! - [`devices`]: one driver per transport behind [`SensorDriver`]
//! - [`manager`]: registry, bulk operations, handler fan-out, recording
//! - [`streaming`]: newline-delimited JSON publisher for external clients

pub mod codec;
pub mod config;
pub mod core;
pub mod devices;
pub mod error;
pub mod manager;
pub mod streaming;
pub mod transport;

// Re-export commonly used types
pub use crate::config::AppConfig;
pub use crate::core::driver::SensorDriver;
pub use crate::core::types::{
    ConnectionType, DataFormat, DataQuality, QualityThresholds, RawValue, SensorConfig,
    SensorReading, SensorStatus, StatusInfo,
};
pub use crate::devices::create_driver;
pub use crate::error::{Error, Result};
pub use crate::manager::{DataHandler, HandlerId, SensorManager};
