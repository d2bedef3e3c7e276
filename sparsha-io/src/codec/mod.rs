//! Wire decoders for device data formats
//!
//! # Formats
//!
//! | Format         | Frame                                          |
//! |----------------|------------------------------------------------|
//! | `ascii_csv`    | `timestamp_ignored,value1[,value2...]\n`       |
//! | `binary_float` | 4-byte big-endian IEEE-754 f32, back-to-back   |
//! | `json`         | `{"timestamp", "sensor_type", "value", "metadata"}` per object |
//! | `mock`         | none (in-process generator)                    |
//!
//! Decoding is all-or-nothing per chunk: a malformed frame rejects the whole
//! chunk so that no partial set of readings is emitted.

mod framing;

pub use framing::FrameBuffer;

use crate::core::types::{DataFormat, RawValue};
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Sensor type used when the wire format does not carry one
pub const DEFAULT_SENSOR_TYPE: &str = "pressure";

/// Decoded sample before quality assessment
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub sensor_type: String,
    pub value: RawValue,
    pub metadata: Map<String, Value>,
}

impl Sample {
    fn received(value: RawValue, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at,
            sensor_type: DEFAULT_SENSOR_TYPE.to_string(),
            value,
            metadata: Map::new(),
        }
    }
}

/// Decode a chunk according to `format`
pub fn decode(format: DataFormat, bytes: &[u8]) -> Result<Vec<Sample>> {
    match format {
        DataFormat::AsciiCsv => decode_ascii_csv(bytes),
        DataFormat::BinaryFloat => decode_binary_float(bytes),
        DataFormat::Json => decode_json(bytes),
        DataFormat::Mock => Ok(Vec::new()),
    }
}

/// Newline-delimited CSV; the first column is ignored and receipt time is used
pub fn decode_ascii_csv(bytes: &[u8]) -> Result<Vec<Sample>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::Parse(format!("csv chunk is not valid UTF-8: {}", e)))?;
    let received_at = Utc::now();
    let mut samples = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let values = line
            .split(',')
            .skip(1)
            .map(|column| {
                let column = column.trim();
                column
                    .parse::<f64>()
                    .map_err(|e| Error::Parse(format!("bad csv value {:?}: {}", column, e)))
            })
            .collect::<Result<Vec<f64>>>()?;
        if values.is_empty() {
            log::trace!("Skipping csv line without values: {:?}", line);
            continue;
        }
        samples.push(Sample::received(RawValue::from_values(values), received_at));
    }

    Ok(samples)
}

/// Big-endian f32 values; a trailing partial float is dropped
pub fn decode_binary_float(bytes: &[u8]) -> Result<Vec<Sample>> {
    let received_at = Utc::now();
    let chunks = bytes.chunks_exact(4);
    if !chunks.remainder().is_empty() {
        log::trace!(
            "Dropping {} trailing bytes of partial float",
            chunks.remainder().len()
        );
    }
    Ok(chunks
        .map(|word| {
            let value = f32::from_be_bytes([word[0], word[1], word[2], word[3]]);
            Sample::received(RawValue::Scalar(f64::from(value)), received_at)
        })
        .collect())
}

#[derive(Deserialize)]
struct JsonFrame {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    sensor_type: Option<String>,
    value: RawValue,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

/// Consecutive JSON objects, separated by whitespace or not at all
pub fn decode_json(bytes: &[u8]) -> Result<Vec<Sample>> {
    let mut samples = Vec::new();
    for frame in serde_json::Deserializer::from_slice(bytes).into_iter::<JsonFrame>() {
        let frame = frame.map_err(|e| Error::Parse(format!("bad json frame: {}", e)))?;
        let timestamp = match frame.timestamp.as_deref() {
            Some(ts) => parse_timestamp(ts)?,
            None => Utc::now(),
        };
        samples.push(Sample {
            timestamp,
            sensor_type: frame
                .sensor_type
                .unwrap_or_else(|| DEFAULT_SENSOR_TYPE.to_string()),
            value: frame.value,
            metadata: frame.metadata.unwrap_or_default(),
        });
    }
    Ok(samples)
}

/// ISO-8601 with or without offset; naive times are taken as UTC
fn parse_timestamp(ts: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::Parse(format!("bad timestamp {:?}: {}", ts, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_csv_two_lines() {
        let samples = decode_ascii_csv(b"0,1.5\n0,2.5\n").unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value, RawValue::Scalar(1.5));
        assert_eq!(samples[1].value, RawValue::Scalar(2.5));
        assert_eq!(samples[0].sensor_type, "pressure");
    }

    #[test]
    fn test_csv_multiple_columns_become_sequence() {
        let samples = decode_ascii_csv(b"123,1.0,2.0,3.0\r\n").unwrap();
        assert_eq!(samples[0].value, RawValue::Sequence(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_csv_malformed_rejects_whole_chunk() {
        assert!(decode_ascii_csv(b"0,1.5\n0,abc\n").is_err());
    }

    #[test]
    fn test_csv_skips_blank_and_timestamp_only_lines() {
        let samples = decode_ascii_csv(b"\n42\n0,3.0\n").unwrap();
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn test_binary_two_floats() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1.0f32.to_be_bytes());
        bytes.extend_from_slice(&(-2.0f32).to_be_bytes());
        let samples = decode_binary_float(&bytes).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value, RawValue::Scalar(1.0));
        assert_eq!(samples[1].value, RawValue::Scalar(-2.0));
    }

    #[test]
    fn test_binary_truncated_drops_tail() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1.0f32.to_be_bytes());
        bytes.extend_from_slice(&[0x40, 0x00]);
        let samples = decode_binary_float(&bytes).unwrap();
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn test_json_defaults() {
        let samples = decode_json(br#"{"value": 3.14}"#).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, RawValue::Scalar(3.14));
        assert_eq!(samples[0].sensor_type, "pressure");
        assert!(samples[0].metadata.is_empty());
    }

    #[test]
    fn test_json_full_frame() {
        let samples = decode_json(
            br#"{"timestamp": "2024-03-01T08:30:00.250", "sensor_type": "pulse", "value": [1, 2], "metadata": {"ch": 2}}"#,
        )
        .unwrap();
        let s = &samples[0];
        assert_eq!(s.sensor_type, "pulse");
        assert_eq!(s.value, RawValue::Sequence(vec![1.0, 2.0]));
        assert_eq!(s.timestamp.year(), 2024);
        assert_eq!(s.timestamp.hour(), 8);
        assert_eq!(s.metadata["ch"], 2);
    }

    #[test]
    fn test_json_pretty_printed_and_concatenated() {
        let samples = decode_json(b"{\n  \"value\": [1.0,\n    2.0]\n}{\"value\": 5}\n").unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value, RawValue::Sequence(vec![1.0, 2.0]));
        assert_eq!(samples[1].value, RawValue::Scalar(5.0));
    }

    #[test]
    fn test_json_missing_value_is_error() {
        assert!(decode_json(br#"{"sensor_type": "pulse"}"#).is_err());
        assert!(decode_json(b"not json").is_err());
        assert!(decode_json(br#"{"value": 1}{"val"#).is_err());
    }

    #[test]
    fn test_json_rfc3339_offset() {
        let samples = decode_json(br#"{"timestamp": "2024-03-01T10:30:00+02:00", "value": 1}"#).unwrap();
        assert_eq!(samples[0].timestamp.hour(), 8);
    }

    #[test]
    fn test_mock_format_yields_nothing() {
        assert!(decode(DataFormat::Mock, b"0,1.0\n").unwrap().is_empty());
    }
}
