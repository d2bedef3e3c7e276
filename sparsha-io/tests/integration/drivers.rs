//! Hardware drivers against in-memory transports

use super::wait_until;
use parking_lot::Mutex;
use sparsha_io::devices::{BluetoothDriver, SerialDriver, WifiDriver};
use sparsha_io::transport::{Connector, MockTransport, Transport};
use sparsha_io::{
    ConnectionType, DataFormat, RawValue, SensorConfig, SensorDriver, SensorReading, SensorStatus,
};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(3);

fn connector(mock: &MockTransport) -> Connector {
    let mock = mock.clone();
    Arc::new(move |_: &SensorConfig| Ok(Box::new(mock.clone()) as Box<dyn Transport>))
}

fn collect(driver: &dyn SensorDriver) -> Arc<Mutex<Vec<SensorReading>>> {
    let readings: Arc<Mutex<Vec<SensorReading>>> = Arc::default();
    let sink = Arc::clone(&readings);
    driver.add_callback(Arc::new(move |r: &SensorReading| sink.lock().push(r.clone())));
    readings
}

#[test]
fn test_serial_reassembles_lines_split_across_reads() {
    let mock = MockTransport::new();
    let config = SensorConfig::new(
        "palm",
        "Palm",
        ConnectionType::Serial,
        DataFormat::AsciiCsv,
        1000,
    );
    let driver = SerialDriver::with_connector(config, connector(&mock));
    let readings = collect(&driver);

    driver.connect().unwrap();
    driver.start_streaming().unwrap();

    mock.inject_read(b"0,1.5\n0,2");
    assert!(wait_until(WAIT, || readings.lock().len() == 1));
    mock.inject_read(b".5,3.5\n");
    assert!(wait_until(WAIT, || readings.lock().len() == 2));

    driver.stop_streaming().unwrap();

    let readings = readings.lock();
    assert_eq!(readings[0].raw_value, RawValue::Scalar(1.5));
    assert_eq!(readings[1].raw_value, RawValue::Sequence(vec![2.5, 3.5]));
    assert_eq!(readings[1].sensor_type, "pressure");
}

#[test]
fn test_serial_read_errors_do_not_end_stream() {
    let mock = MockTransport::new();
    let config = SensorConfig::new(
        "palm",
        "Palm",
        ConnectionType::Usb,
        DataFormat::AsciiCsv,
        1000,
    );
    let driver = SerialDriver::with_connector(config, connector(&mock));
    let readings = collect(&driver);

    driver.connect().unwrap();
    driver.start_streaming().unwrap();

    mock.set_fail_reads(true);
    assert!(wait_until(WAIT, || driver.stats().1 >= 3));
    mock.set_fail_reads(false);

    mock.inject_read(b"0,7.0\n");
    assert!(wait_until(WAIT, || readings.lock().len() == 1));
    assert_eq!(driver.status(), SensorStatus::Streaming);

    driver.disconnect().unwrap();
    assert_eq!(driver.status(), SensorStatus::Disconnected);
}

#[test]
fn test_bluetooth_json_with_calibration() {
    let mock = MockTransport::new();
    let config = SensorConfig::new(
        "bt",
        "Glove",
        ConnectionType::Bluetooth,
        DataFormat::Json,
        500,
    )
    .with_param("mac_address", "00:11:22:33:44:55")
    .with_calibration("zero_offset", 1.0)
    .with_calibration("scale_factor", 2.0);
    let driver = BluetoothDriver::with_connector(config, connector(&mock));
    let readings = collect(&driver);

    driver.connect().unwrap();
    driver.start_streaming().unwrap();
    mock.inject_read(
        br#"{"timestamp": "2024-05-01T12:00:00Z", "sensor_type": "pulse", "value": 4.0, "metadata": {"finger": 2}}
{broken
{"value": [1.0, 3.0]}
"#,
    );
    // The malformed line rejects its whole chunk
    std::thread::sleep(Duration::from_millis(100));
    assert!(readings.lock().is_empty());

    mock.inject_read(b"{\"value\": [1.0, 3.0]}\n");
    assert!(wait_until(WAIT, || readings.lock().len() == 1));
    driver.stop_streaming().unwrap();

    let reading = readings.lock()[0].clone();
    assert_eq!(reading.raw_value, RawValue::Sequence(vec![1.0, 3.0]));
    assert_eq!(
        reading.processed_value,
        Some(RawValue::Sequence(vec![0.0, 4.0]))
    );
    assert_eq!(mock.written_text(), "START\nSTOP\n");
}

#[test]
fn test_wifi_binary_floats_across_reads() {
    let mock = MockTransport::new();
    let config = SensorConfig::new(
        "net",
        "Multimodal",
        ConnectionType::Wifi,
        DataFormat::BinaryFloat,
        1000,
    )
    .with_calibration("duration", 0.0);
    let driver = WifiDriver::with_connector(config, connector(&mock));
    let readings = collect(&driver);

    driver.connect().unwrap();
    driver.calibrate().unwrap();
    driver.start_streaming().unwrap();

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&1.0f32.to_be_bytes());
    bytes.extend_from_slice(&(-2.0f32).to_be_bytes());
    mock.inject_read(&bytes[..6]);
    assert!(wait_until(WAIT, || readings.lock().len() == 1));
    mock.inject_read(&bytes[6..]);
    assert!(wait_until(WAIT, || readings.lock().len() == 2));

    driver.stop_streaming().unwrap();
    let values: Vec<Option<f64>> = readings
        .lock()
        .iter()
        .map(|r| r.raw_value.as_scalar())
        .collect();
    assert_eq!(values, vec![Some(1.0), Some(-2.0)]);
    assert_eq!(
        mock.written_text(),
        "CALIBRATE\nSTART_STREAM\nSTOP_STREAM\n"
    );
}

#[test]
fn test_state_machine_guards() {
    let mock = MockTransport::new();
    let config = SensorConfig::new(
        "g",
        "Guarded",
        ConnectionType::Serial,
        DataFormat::AsciiCsv,
        100,
    );
    let driver = SerialDriver::with_connector(config, connector(&mock));

    assert!(driver.start_streaming().is_err());
    assert!(driver.stop_streaming().is_err());
    assert!(driver.calibrate().is_err());
    assert_eq!(driver.status(), SensorStatus::Disconnected);

    assert!(driver.disconnect().is_ok());
    assert!(driver.disconnect().is_ok());
    assert_eq!(driver.status(), SensorStatus::Disconnected);

    driver.connect().unwrap();
    assert!(driver.connect().is_err());
    assert_eq!(driver.status(), SensorStatus::Connected);
}

#[test]
fn test_connector_failure_sets_error_and_allows_retry() {
    let attempts = Arc::new(Mutex::new(0));
    let attempts_clone = Arc::clone(&attempts);
    let connector: Connector = Arc::new(move |config: &SensorConfig| {
        let mut n = attempts_clone.lock();
        *n += 1;
        if *n == 1 {
            Err(sparsha_io::Error::Other(format!(
                "{} unplugged",
                config.device_id
            )))
        } else {
            Ok(Box::new(MockTransport::new()) as Box<dyn Transport>)
        }
    });
    let config = SensorConfig::new(
        "r",
        "Retry",
        ConnectionType::Serial,
        DataFormat::AsciiCsv,
        100,
    );
    let driver = SerialDriver::with_connector(config, connector);

    assert!(matches!(
        driver.connect(),
        Err(sparsha_io::Error::Connection { .. })
    ));
    assert_eq!(driver.status(), SensorStatus::Error);

    driver.connect().unwrap();
    assert_eq!(driver.status(), SensorStatus::Connected);
    assert_eq!(*attempts.lock(), 2);
}

#[test]
fn test_bluetooth_json_without_newlines() {
    let mock = MockTransport::new();
    let config = SensorConfig::new(
        "bt",
        "Glove",
        ConnectionType::Bluetooth,
        DataFormat::Json,
        500,
    )
    .with_param("mac_address", "00:11:22:33:44:55");
    let driver = BluetoothDriver::with_connector(config, connector(&mock));
    let readings = collect(&driver);

    driver.connect().unwrap();
    driver.start_streaming().unwrap();

    mock.inject_read(br#"{"value": 3.14}"#);
    assert!(wait_until(WAIT, || readings.lock().len() == 1));

    // Pretty-printed object arriving in two writes
    mock.inject_read(b"{\n  \"sensor_type\": \"pulse\",\n  \"value\": [");
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(readings.lock().len(), 1);
    mock.inject_read(b"1.0,\n    2.0]\n}");
    assert!(wait_until(WAIT, || readings.lock().len() == 2));

    driver.stop_streaming().unwrap();
    let readings = readings.lock();
    assert_eq!(readings[0].raw_value, RawValue::Scalar(3.14));
    assert_eq!(readings[1].sensor_type, "pulse");
    assert_eq!(readings[1].raw_value, RawValue::Sequence(vec![1.0, 2.0]));
}

#[test]
fn test_lost_link_sets_error_and_reconnect_resumes() {
    let current = Arc::new(Mutex::new(MockTransport::new()));
    let slot = Arc::clone(&current);
    let connector: Connector = Arc::new(move |_: &SensorConfig| {
        Ok(Box::new(slot.lock().clone()) as Box<dyn Transport>)
    });
    let config = SensorConfig::new(
        "palm",
        "Palm",
        ConnectionType::Serial,
        DataFormat::AsciiCsv,
        1000,
    );
    let driver = SerialDriver::with_connector(config, connector);
    let readings = collect(&driver);

    driver.connect().unwrap();
    driver.start_streaming().unwrap();
    current.lock().hang_up();

    assert!(wait_until(WAIT, || driver.status() == SensorStatus::Error));
    assert!(!driver.is_streaming());

    let replacement = MockTransport::new();
    *current.lock() = replacement.clone();
    driver.connect().unwrap();
    driver.start_streaming().unwrap();
    replacement.inject_read(b"0,4.0\n");
    assert!(wait_until(WAIT, || readings.lock().len() == 1));
    assert_eq!(driver.status(), SensorStatus::Streaming);

    driver.disconnect().unwrap();
}
