//! Outbound message shapes

use crate::core::types::{DataQuality, RawValue, SensorReading};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message type tag for reading broadcasts
pub const SENSOR_DATA: &str = "sensor_data";

/// One reading as broadcast to stream clients
///
/// Serialized as a single JSON object per line:
/// `{"type":"sensor_data","timestamp":"...","device_id":"...","sensor_type":"...",
///   "value":1.5,"quality":"good","metadata":{}}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReadingMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub sensor_type: String,
    /// Raw value; arrays stay arrays
    pub value: RawValue,
    pub quality: DataQuality,
    pub metadata: Map<String, Value>,
}

impl From<&SensorReading> for ReadingMessage {
    fn from(reading: &SensorReading) -> Self {
        Self {
            kind: SENSOR_DATA.to_string(),
            timestamp: reading.timestamp,
            device_id: reading.device_id.clone(),
            sensor_type: reading.sensor_type.clone(),
            value: reading.raw_value.clone(),
            quality: reading.quality,
            metadata: reading.metadata.clone(),
        }
    }
}
