//! End-to-end: mock sensor -> manager -> publisher -> TCP client

use super::{mock_sensor, wait_until};
use sparsha_io::SensorManager;
use sparsha_io::streaming::{ReadingMessage, ReadingPublisher};
use std::io::{BufRead, BufReader};
use std::net::TcpStream;
use std::time::Duration;

#[test]
fn test_client_receives_mock_readings() {
    let publisher = ReadingPublisher::new("127.0.0.1:0", 1024).unwrap();
    let client = TcpStream::connect(publisher.local_addr()).unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(3)))
        .unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        publisher.client_count() == 1
    }));

    let manager = SensorManager::new();
    manager.register_sensor(mock_sensor("stream", 200)).unwrap();
    manager.add_data_handler(publisher.handler());
    manager.connect_all();
    manager.start_all_streaming();

    let mut reader = BufReader::new(client);
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    manager.stop_all_streaming();

    let message: ReadingMessage = serde_json::from_str(&line).unwrap();
    assert_eq!(message.kind, "sensor_data");
    assert_eq!(message.device_id, "stream");
    assert_eq!(message.sensor_type, "pulse");
    assert_eq!(message.metadata["mock"], serde_json::Value::Bool(true));
    assert!(publisher.published() >= 1);
}
