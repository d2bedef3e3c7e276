//! Mock device driver for hardware-free development
//!
//! Produces a synthetic pulse waveform (see [`signal`]) at the configured
//! sampling rate. Every reading carries `{"mock": true, "sample_index": n}`
//! metadata and `sensor_type = "pulse"`.
//!
//! # Connection parameters
//!
//! | Key            | Default | Meaning                               |
//! |----------------|---------|---------------------------------------|
//! | `pulse_rate`   | `72`    | Beats per minute of the fundamental   |
//! | `seed`         | `0`     | Noise seed; 0 = random each run       |
//! | `fail_connect` | `false` | Make `connect` fail, for fault drills |
//!
//! # Thread Model
//!
//! ```text
//! start_streaming ──spawns──▶ mock-<device_id> ──emit──▶ callbacks
//! ```
//!
//! The sample index restarts at zero every time streaming starts.

mod noise;
pub mod signal;

use crate::codec::Sample;
use crate::core::driver::{DriverCore, ReadingCallback, SensorDriver};
use crate::core::types::{RawValue, SensorConfig, SensorReading, SensorStatus};
use crate::error::{Error, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use signal::{DEFAULT_PULSE_RATE, PulseSignal};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub const MOCK_SENSOR_TYPE: &str = "pulse";

/// In-process signal generator behind the driver contract
pub struct MockDriver {
    core: Arc<DriverCore>,
    generator: Mutex<Option<JoinHandle<()>>>,
}

impl MockDriver {
    pub fn new(config: SensorConfig) -> Self {
        Self {
            core: Arc::new(DriverCore::new(config)),
            generator: Mutex::new(None),
        }
    }

    fn join_generator(&self) {
        let Some(handle) = self.generator.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log::error!("{}: generator thread panicked", self.core.device_id());
        }
    }
}

impl SensorDriver for MockDriver {
    fn config(&self) -> &SensorConfig {
        self.core.config()
    }

    fn status(&self) -> SensorStatus {
        self.core.status()
    }

    fn is_streaming(&self) -> bool {
        self.core.is_streaming()
    }

    fn add_callback(&self, callback: ReadingCallback) {
        self.core.add_callback(callback);
    }

    fn connect(&self) -> Result<()> {
        self.core.require_closed()?;
        self.core.set_status(SensorStatus::Connecting);

        if self.core.config().param_bool("fail_connect").unwrap_or(false) {
            self.core.set_status(SensorStatus::Error);
            log::error!("{}: simulated connection failure", self.core.device_id());
            return Err(Error::Connection {
                device_id: self.core.device_id().to_string(),
                reason: "simulated failure".into(),
            });
        }

        self.core.set_status(SensorStatus::Connected);
        log::info!("{}: mock sensor connected", self.core.device_id());
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.core.set_streaming(false);
        self.join_generator();
        self.core.set_status(SensorStatus::Disconnected);
        log::info!("{}: mock sensor disconnected", self.core.device_id());
        Ok(())
    }

    fn start_streaming(&self) -> Result<()> {
        self.core.enter(
            "start streaming",
            SensorStatus::Connected,
            SensorStatus::Streaming,
        )?;

        let config = self.core.config();
        let pulse_rate = config.param_f64("pulse_rate").unwrap_or(DEFAULT_PULSE_RATE);
        let seed = config.param_u64("seed").unwrap_or(0);
        let signal = PulseSignal::new(pulse_rate, config.sampling_rate, seed);

        self.core.set_streaming(true);

        let core = Arc::clone(&self.core);
        let spawned = thread::Builder::new()
            .name(format!("mock-{}", config.device_id))
            .spawn(move || generator_loop(core, signal));

        match spawned {
            Ok(handle) => {
                *self.generator.lock() = Some(handle);
                log::info!(
                    "{}: mock streaming at {} Hz ({} bpm)",
                    config.device_id,
                    config.sampling_rate,
                    pulse_rate
                );
                Ok(())
            }
            Err(e) => {
                self.core.set_streaming(false);
                self.core.set_status(SensorStatus::Connected);
                Err(Error::ThreadSpawn(e.to_string()))
            }
        }
    }

    fn stop_streaming(&self) -> Result<()> {
        self.core.require("stop streaming", SensorStatus::Streaming)?;
        self.core.set_streaming(false);
        self.join_generator();
        self.core.set_status(SensorStatus::Connected);
        log::info!("{}: mock streaming stopped", self.core.device_id());
        Ok(())
    }

    fn calibrate(&self) -> Result<()> {
        self.core
            .enter("calibrate", SensorStatus::Connected, SensorStatus::Calibrating)?;
        thread::sleep(self.core.config().calibration_duration());
        if self
            .core
            .transition(SensorStatus::Calibrating, SensorStatus::Connected)
        {
            log::info!("{}: mock calibration complete", self.core.device_id());
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation: "finish calibration",
                status: self.core.status(),
            })
        }
    }

    /// The generator produces readings directly; there are no bytes to parse
    fn parse_data(&self, _raw: &[u8]) -> Vec<SensorReading> {
        Vec::new()
    }

    fn stats(&self) -> (u64, u64) {
        self.core.stats()
    }
}

impl Drop for MockDriver {
    fn drop(&mut self) {
        self.core.set_streaming(false);
        self.join_generator();
    }
}

fn generator_loop(core: Arc<DriverCore>, mut signal: PulseSignal) {
    let period = core.config().sample_period();
    let mut index: u64 = 0;

    while core.is_streaming() {
        let mut metadata = Map::new();
        metadata.insert("mock".into(), Value::Bool(true));
        metadata.insert("sample_index".into(), Value::from(index));

        let reading = core.build_reading(Sample {
            timestamp: Utc::now(),
            sensor_type: MOCK_SENSOR_TYPE.to_string(),
            value: RawValue::Scalar(signal.sample(index)),
            metadata,
        });
        core.emit(&reading);

        index += 1;
        thread::sleep(period);
    }

    log::debug!(
        "{}: generator exiting after {} samples",
        core.device_id(),
        index
    );
}
