//! Integration tests for sparsha-io
//!
//! Hardware drivers run against in-memory transports; the manager and the
//! publisher run against mock-generator devices. Nothing here needs real
//! hardware.
//!
//! ```bash
//! cargo test --test integration -- --nocapture
//! ```

mod drivers;
mod manager;
mod streaming;

use sparsha_io::{ConnectionType, DataFormat, SensorConfig};
use std::thread;
use std::time::{Duration, Instant};

/// Mock pulse sensor with instant calibration
pub fn mock_sensor(device_id: &str, sampling_rate: u32) -> SensorConfig {
    SensorConfig::new(
        device_id,
        device_id,
        ConnectionType::Mock,
        DataFormat::Mock,
        sampling_rate,
    )
    .with_param("seed", 5)
    .with_calibration("duration", 0.0)
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
