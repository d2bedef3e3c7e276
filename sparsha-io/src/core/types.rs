//! Core data types for sensor configuration and readings.
//!
//! Key types:
//! - [`SensorConfig`]: Immutable descriptor for one physical or virtual device
//! - [`SensorReading`]: One sampled, quality-assessed data point
//! - [`SensorStatus`]: Driver lifecycle state
//! - [`RawValue`]: Scalar or ordered sequence of samples

use crate::core::quality::assess_quality;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Calibration wait used when `calibration_params.duration` is absent
pub const DEFAULT_CALIBRATION_SECS: f64 = 2.0;

/// Physical or virtual medium connecting to a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Serial,
    Usb,
    Bluetooth,
    Wifi,
    Ethernet,
    Mock,
}

impl ConnectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Serial => "serial",
            ConnectionType::Usb => "usb",
            ConnectionType::Bluetooth => "bluetooth",
            ConnectionType::Wifi => "wifi",
            ConnectionType::Ethernet => "ethernet",
            ConnectionType::Mock => "mock",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" => Ok(ConnectionType::Serial),
            "usb" => Ok(ConnectionType::Usb),
            "bluetooth" => Ok(ConnectionType::Bluetooth),
            "wifi" => Ok(ConnectionType::Wifi),
            "ethernet" => Ok(ConnectionType::Ethernet),
            "mock" => Ok(ConnectionType::Mock),
            _ => Err(Error::UnsupportedConnection(s.to_string())),
        }
    }
}

/// Bytes-on-the-wire encoding produced by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    /// `timestamp_ignored,value1[,value2...]` lines
    AsciiCsv,
    /// Big-endian IEEE-754 f32, back-to-back
    BinaryFloat,
    /// One JSON object per message
    Json,
    /// In-process generator, no byte parsing
    Mock,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::AsciiCsv => "ascii_csv",
            DataFormat::BinaryFloat => "binary_float",
            DataFormat::Json => "json",
            DataFormat::Mock => "mock",
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ascii_csv" => Ok(DataFormat::AsciiCsv),
            "binary_float" => Ok(DataFormat::BinaryFloat),
            "json" => Ok(DataFormat::Json),
            "mock" => Ok(DataFormat::Mock),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Device-specific bounds used to classify readings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Magnitudes below this are POOR
    pub min_value: f64,
    /// Magnitudes above this are POOR
    pub max_value: f64,
    /// In-bounds magnitudes above this are EXCELLENT
    pub excellent_threshold: f64,
    /// In-bounds magnitudes above this are GOOD
    pub good_threshold: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_value: 0.0,
            max_value: 1000.0,
            excellent_threshold: 100.0,
            good_threshold: 10.0,
        }
    }
}

/// Immutable descriptor for one device
///
/// Re-registering a device id replaces the whole descriptor; fields are
/// never mutated while a driver owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub device_id: String,
    pub device_name: String,
    pub connection_type: ConnectionType,
    /// Transport-specific parameters (port/baudrate, mac_address, host/port, ...)
    #[serde(default)]
    pub connection_params: BTreeMap<String, Value>,
    /// Samples per second
    pub sampling_rate: u32,
    pub data_format: DataFormat,
    /// Calibration constants (`duration`, `zero_offset`, `scale_factor`, `nonlinearity`)
    #[serde(default)]
    pub calibration_params: BTreeMap<String, f64>,
    #[serde(default)]
    pub quality_thresholds: QualityThresholds,
}

impl SensorConfig {
    pub fn new(
        device_id: &str,
        device_name: &str,
        connection_type: ConnectionType,
        data_format: DataFormat,
        sampling_rate: u32,
    ) -> Self {
        Self {
            device_id: device_id.to_string(),
            device_name: device_name.to_string(),
            connection_type,
            connection_params: BTreeMap::new(),
            sampling_rate,
            data_format,
            calibration_params: BTreeMap::new(),
            quality_thresholds: QualityThresholds::default(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.connection_params.insert(key.to_string(), value.into());
        self
    }

    pub fn with_calibration(mut self, key: &str, value: f64) -> Self {
        self.calibration_params.insert(key.to_string(), value);
        self
    }

    pub fn with_thresholds(mut self, thresholds: QualityThresholds) -> Self {
        self.quality_thresholds = thresholds;
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.connection_params.get(key).and_then(Value::as_str)
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.connection_params.get(key).and_then(Value::as_u64)
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.connection_params.get(key).and_then(Value::as_f64)
    }

    pub fn param_bool(&self, key: &str) -> Option<bool> {
        self.connection_params.get(key).and_then(Value::as_bool)
    }

    /// Delay between polls of the sampling loop
    pub fn sample_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.sampling_rate.max(1)))
    }

    /// How long `calibrate` waits for the device
    pub fn calibration_duration(&self) -> Duration {
        let secs = self
            .calibration_params
            .get("duration")
            .copied()
            .filter(|d| d.is_finite() && *d >= 0.0)
            .unwrap_or(DEFAULT_CALIBRATION_SECS);
        Duration::from_secs_f64(secs)
    }

    /// Reject descriptors no driver can honor
    pub fn validate(&self) -> Result<()> {
        if self.device_id.trim().is_empty() {
            return Err(Error::InvalidConfig("device_id must not be empty".into()));
        }
        if self.sampling_rate == 0 {
            return Err(Error::InvalidConfig(format!(
                "{}: sampling_rate must be greater than zero",
                self.device_id
            )));
        }
        let t = &self.quality_thresholds;
        if t.min_value > t.max_value {
            return Err(Error::InvalidConfig(format!(
                "{}: min_value {} exceeds max_value {}",
                self.device_id, t.min_value, t.max_value
            )));
        }
        let generator = self.connection_type == ConnectionType::Mock;
        let generated = self.data_format == DataFormat::Mock;
        if generator != generated {
            return Err(Error::InvalidConfig(format!(
                "{}: {} connection cannot use {} data format",
                self.device_id, self.connection_type, self.data_format
            )));
        }
        Ok(())
    }
}

/// Reading payload: a scalar or an ordered sequence, never both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Scalar(f64),
    Sequence(Vec<f64>),
}

impl RawValue {
    /// Scalar when exactly one value, sequence otherwise
    pub fn from_values(mut values: Vec<f64>) -> Self {
        if values.len() == 1 {
            RawValue::Scalar(values.remove(0))
        } else {
            RawValue::Sequence(values)
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            RawValue::Scalar(v) => Some(*v),
            RawValue::Sequence(_) => None,
        }
    }

    pub fn values(&self) -> &[f64] {
        match self {
            RawValue::Scalar(v) => std::slice::from_ref(v),
            RawValue::Sequence(vs) => vs,
        }
    }

    /// Apply `f` to every element, preserving shape
    pub fn map(&self, f: impl Fn(f64) -> f64) -> RawValue {
        match self {
            RawValue::Scalar(v) => RawValue::Scalar(f(*v)),
            RawValue::Sequence(vs) => RawValue::Sequence(vs.iter().copied().map(f).collect()),
        }
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Scalar(v)
    }
}

impl From<Vec<f64>> for RawValue {
    fn from(vs: Vec<f64>) -> Self {
        RawValue::Sequence(vs)
    }
}

/// Trustworthiness grade of a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    Invalid,
}

impl DataQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataQuality::Excellent => "excellent",
            DataQuality::Good => "good",
            DataQuality::Fair => "fair",
            DataQuality::Poor => "poor",
            DataQuality::Invalid => "invalid",
        }
    }

    /// 0 for EXCELLENT up to 4 for INVALID
    pub fn severity(&self) -> u8 {
        match self {
            DataQuality::Excellent => 0,
            DataQuality::Good => 1,
            DataQuality::Fair => 2,
            DataQuality::Poor => 3,
            DataQuality::Invalid => 4,
        }
    }

    /// The less trustworthy of two grades
    pub fn worst(self, other: DataQuality) -> DataQuality {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for DataQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Driver lifecycle state
///
/// ```text
/// DISCONNECTED -> CONNECTING -> CONNECTED -> STREAMING -> CONNECTED -> DISCONNECTED
///                                   |  ^
///                                   v  |
///                                CALIBRATING
/// ```
///
/// `ERROR` is entered when a transition attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    Disconnected,
    Connecting,
    Connected,
    Streaming,
    Calibrating,
    Error,
}

impl SensorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStatus::Disconnected => "disconnected",
            SensorStatus::Connecting => "connecting",
            SensorStatus::Connected => "connected",
            SensorStatus::Streaming => "streaming",
            SensorStatus::Calibrating => "calibrating",
            SensorStatus::Error => "error",
        }
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped, quality-assessed data sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Capture time when derivable, otherwise time of receipt
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    /// Free-form kind, e.g. "pressure"
    pub sensor_type: String,
    pub raw_value: RawValue,
    /// Set by post-processing when calibration constants are configured
    pub processed_value: Option<RawValue>,
    pub quality: DataQuality,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl SensorReading {
    /// Build a reading with its quality assessed against `thresholds`
    pub fn assessed(
        timestamp: DateTime<Utc>,
        device_id: &str,
        sensor_type: &str,
        raw_value: RawValue,
        metadata: Map<String, Value>,
        thresholds: &QualityThresholds,
    ) -> Self {
        let quality = assess_quality(&raw_value, thresholds);
        Self {
            timestamp,
            device_id: device_id.to_string(),
            sensor_type: sensor_type.to_string(),
            raw_value,
            processed_value: None,
            quality,
            metadata,
        }
    }

    /// `to_dict`-equivalent JSON object (RFC 3339 timestamp, lowercase quality)
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Status snapshot for one registered device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusInfo {
    pub status: SensorStatus,
    pub device_name: String,
    pub connection_type: ConnectionType,
    pub sampling_rate: u32,
    pub is_streaming: bool,
}
