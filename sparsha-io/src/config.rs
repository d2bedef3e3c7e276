//! Configuration for the Sparsha acquisition daemon
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [streaming]
//! enabled = true
//! bind_address = "0.0.0.0:8765"
//! queue_capacity = 2000
//!
//! [manager]
//! history_capacity = 10000
//! auto_connect = true
//! auto_stream = true
//!
//! [[sensors]]
//! device_id = "palm_pressure"
//! device_name = "Palm Pressure Sensor"
//! connection_type = "serial"
//! sampling_rate = 1000
//! data_format = "ascii_csv"
//!
//! [sensors.connection_params]
//! port = "/dev/ttyUSB0"
//! baudrate = 115200
//! ```

use crate::core::types::SensorConfig;
use crate::devices::transport_resource;
use crate::error::{Error, Result};
use crate::manager::ManagerConfig;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Reading stream for external consumers
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub enabled: bool,
    /// TCP bind address for newline-delimited JSON readings
    ///
    /// Examples:
    /// - `0.0.0.0:8765` - Bind to all interfaces
    /// - `127.0.0.1:8765` - Localhost only
    pub bind_address: String,
    /// Readings buffered between device threads and the publisher thread
    pub queue_capacity: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8765".to_string(),
            queue_capacity: 2000,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file and validate it
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists; `None` means the caller should use defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Every sensor must be valid on its own; ids and transports must be unique
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let mut resources = HashMap::new();
        for sensor in &self.sensors {
            sensor.validate()?;
            if !seen.insert(sensor.device_id.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate device_id {}",
                    sensor.device_id
                )));
            }
            if let Some(resource) = transport_resource(sensor)
                && let Some(owner) = resources.insert(resource.clone(), sensor.device_id.as_str())
            {
                return Err(Error::InvalidConfig(format!(
                    "{} and {} both use {}",
                    owner, sensor.device_id, resource
                )));
            }
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            streaming: StreamingConfig::default(),
            manager: ManagerConfig::default(),
            sensors: vec![profiles::mock_pulse()],
        }
    }
}

/// Predefined device profiles
///
/// Defaults for the hardware this daemon ships with; firmware on these
/// devices expects exactly these rates and encodings.
pub mod profiles {
    use crate::core::types::{ConnectionType, DataFormat, SensorConfig};
    use crate::devices::{serial, wifi};

    /// Serial pressure sensor: 115200 baud, 1 kHz CSV lines
    pub fn serial_pressure() -> SensorConfig {
        SensorConfig::new(
            "pressure_sensor_1",
            "Serial Pressure Sensor",
            ConnectionType::Serial,
            DataFormat::AsciiCsv,
            1000,
        )
        .with_param("port", serial::DEFAULT_PORT)
        .with_param("baudrate", serial::DEFAULT_BAUDRATE)
        .with_calibration("duration", 2.0)
    }

    /// Bluetooth pulse sensor: 500 Hz JSON messages
    pub fn bluetooth_pulse() -> SensorConfig {
        SensorConfig::new(
            "pulse_sensor_bt",
            "Bluetooth Pulse Sensor",
            ConnectionType::Bluetooth,
            DataFormat::Json,
            500,
        )
        .with_param("mac_address", "00:11:22:33:44:55")
        .with_param("channel", 1)
        .with_calibration("duration", 2.0)
    }

    /// WiFi multimodal sensor: 1 kHz big-endian floats over TCP
    pub fn wifi_multimodal() -> SensorConfig {
        SensorConfig::new(
            "multimodal_wifi",
            "WiFi Multimodal Sensor",
            ConnectionType::Wifi,
            DataFormat::BinaryFloat,
            1000,
        )
        .with_param("host", wifi::DEFAULT_HOST)
        .with_param("port", wifi::DEFAULT_PORT)
        .with_calibration("duration", 2.0)
    }

    /// In-process pulse generator at 1 kHz
    pub fn mock_pulse() -> SensorConfig {
        SensorConfig::new(
            "mock_sensor",
            "Mock Pulse Sensor",
            ConnectionType::Mock,
            DataFormat::Mock,
            1000,
        )
        .with_param("pulse_rate", 72.0)
        .with_calibration("duration", 1.0)
    }

    pub fn all() -> Vec<SensorConfig> {
        vec![
            serial_pressure(),
            bluetooth_pulse(),
            wifi_multimodal(),
            mock_pulse(),
        ]
    }
}
