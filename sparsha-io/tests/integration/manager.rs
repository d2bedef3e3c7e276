//! SensorManager scenarios with mock-generator devices

use super::{mock_sensor, wait_until};
use parking_lot::Mutex;
use sparsha_io::{DataQuality, SensorManager, SensorReading, SensorStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(3);

fn sample_index(reading: &SensorReading) -> u64 {
    reading
        .metadata
        .get("sample_index")
        .and_then(|v| v.as_u64())
        .unwrap_or(u64::MAX)
}

#[test]
fn test_streaming_fan_out_preserves_per_device_order() {
    let manager = SensorManager::new();
    manager.register_sensor(mock_sensor("left", 500)).unwrap();
    manager.register_sensor(mock_sensor("right", 500)).unwrap();

    let seen: Arc<Mutex<HashMap<String, Vec<u64>>>> = Arc::default();
    let seen_clone = Arc::clone(&seen);
    manager.add_data_handler(Arc::new(move |r: &SensorReading| {
        seen_clone
            .lock()
            .entry(r.device_id.clone())
            .or_default()
            .push(sample_index(r));
    }));

    assert!(manager.connect_all().values().all(|ok| *ok));
    assert_eq!(manager.start_all_streaming().len(), 2);

    assert!(wait_until(WAIT, || {
        let seen = seen.lock();
        seen.get("left").is_some_and(|v| v.len() >= 20)
            && seen.get("right").is_some_and(|v| v.len() >= 20)
    }));

    assert_eq!(manager.stop_all_streaming().len(), 2);

    for indices in seen.lock().values() {
        assert!(indices.windows(2).all(|w| w[1] == w[0] + 1));
        assert_eq!(indices[0], 0);
    }

    let status = manager.get_sensor_status();
    assert!(
        status
            .values()
            .all(|s| s.status == SensorStatus::Connected && !s.is_streaming)
    );
}

#[test]
fn test_partial_failure_is_reported_per_device() {
    let manager = SensorManager::new();
    manager.register_sensor(mock_sensor("good", 200)).unwrap();
    manager
        .register_sensor(mock_sensor("flaky", 200).with_param("fail_connect", true))
        .unwrap();

    let connected = manager.connect_all();
    assert_eq!(connected.get("good"), Some(&true));
    assert_eq!(connected.get("flaky"), Some(&false));
    assert_eq!(
        manager.get_sensor("flaky").unwrap().status(),
        SensorStatus::Error
    );

    let started = manager.start_all_streaming();
    assert_eq!(started.len(), 1);
    assert_eq!(started.get("good"), Some(&true));

    // Devices in ERROR are retried by the next connect_all
    let retried = manager.connect_all();
    assert_eq!(retried.keys().collect::<Vec<_>>(), vec!["flaky"]);

    manager.shutdown();
    assert!(
        manager
            .get_sensor_status()
            .values()
            .all(|s| s.status == SensorStatus::Disconnected)
    );
}

#[test]
fn test_recording_captures_consecutive_readings() {
    let manager = SensorManager::new();
    manager.register_sensor(mock_sensor("rec", 1000)).unwrap();
    manager.connect_all();
    manager.start_all_streaming();

    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = Arc::clone(&count);
    manager.add_data_handler(Arc::new(move |_: &SensorReading| {
        count_clone.fetch_add(1, Ordering::Relaxed);
    }));

    manager.start_recording();
    assert!(manager.is_recording());
    let target = count.load(Ordering::Relaxed) + 30;
    assert!(wait_until(WAIT, || count.load(Ordering::Relaxed) >= target));
    let recorded = manager.stop_recording();
    manager.stop_all_streaming();

    assert!(recorded.len() >= 20);
    let indices: Vec<u64> = recorded.iter().map(sample_index).collect();
    assert!(indices.windows(2).all(|w| w[1] == w[0] + 1));
    assert!(recorded.iter().all(|r| r.quality != DataQuality::Invalid));

    assert!(!manager.is_recording());
    assert!(manager.stop_recording().is_empty());
}

#[test]
fn test_panicking_handler_does_not_stop_dispatch() {
    let manager = SensorManager::new();
    manager.register_sensor(mock_sensor("p", 500)).unwrap();

    manager.add_data_handler(Arc::new(|_: &SensorReading| panic!("consumer bug")));
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = Arc::clone(&count);
    let id = manager.add_data_handler(Arc::new(move |_: &SensorReading| {
        count_clone.fetch_add(1, Ordering::Relaxed);
    }));

    manager.connect_all();
    manager.start_all_streaming();
    assert!(wait_until(WAIT, || count.load(Ordering::Relaxed) >= 10));
    assert!(manager.get_sensor("p").unwrap().is_streaming());

    assert!(manager.remove_data_handler(id));
    manager.stop_all_streaming();
}

#[test]
fn test_history_and_quality_report() {
    let manager = SensorManager::new();
    manager.register_sensor(mock_sensor("h", 1000)).unwrap();
    manager.connect_all();
    manager.start_all_streaming();

    assert!(wait_until(WAIT, || {
        manager.get_sensor_data("h", Duration::from_secs(60)).len() >= 50
    }));
    manager.stop_all_streaming();

    let history = manager.get_sensor_data("h", Duration::from_secs(60));
    assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let report = manager
        .quality_report("h", Duration::from_secs(60))
        .unwrap();
    assert_eq!(report.sample_count, history.len());
    assert_eq!(report.completeness, 1.0);
    assert!(!report.recommendations.is_empty());

    manager.unregister_sensor("h").unwrap();
    assert!(manager.get_sensor_data("h", Duration::from_secs(60)).is_empty());
    assert!(manager.quality_report("h", Duration::from_secs(60)).is_none());
}

#[test]
fn test_unregister_streaming_sensor_disconnects_it() {
    let manager = SensorManager::new();
    manager.register_sensor(mock_sensor("u", 500)).unwrap();
    manager.connect_all();
    manager.start_all_streaming();

    let driver = manager.get_sensor("u").unwrap();
    assert!(driver.is_streaming());

    manager.unregister_sensor("u").unwrap();
    assert!(!driver.is_streaming());
    assert_eq!(driver.status(), SensorStatus::Disconnected);
    assert!(manager.is_empty());
    assert!(manager.connect_all().is_empty());
}

#[test]
fn test_calibrate_all_skips_streaming_devices() {
    let manager = SensorManager::new();
    manager.register_sensor(mock_sensor("idle", 100)).unwrap();
    manager.register_sensor(mock_sensor("busy", 100)).unwrap();
    manager.connect_all();
    manager.get_sensor("busy").unwrap().start_streaming().unwrap();

    let calibrated = manager.calibrate_all();
    assert_eq!(calibrated.keys().collect::<Vec<_>>(), vec!["idle"]);
    assert_eq!(
        manager.get_sensor("busy").unwrap().status(),
        SensorStatus::Streaming
    );
}
