//! SensorDriver trait and the state shared by every driver

use crate::codec::{self, Sample};
use crate::core::processing::CalibrationModel;
use crate::core::types::{SensorConfig, SensorReading, SensorStatus};
use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Consumer invoked for every reading a driver produces
pub type ReadingCallback = Arc<dyn Fn(&SensorReading) + Send + Sync>;

/// Per-transport driver contract
///
/// Operations take `&self` so the manager can drive many devices from
/// parallel threads; implementations keep their state behind locks and
/// atomics. `Ok(())` means the transition happened; on `Err` the error has
/// already been logged and the status reflects the failure.
pub trait SensorDriver: Send + Sync {
    /// Descriptor the driver was built from
    fn config(&self) -> &SensorConfig;

    fn status(&self) -> SensorStatus;

    fn is_streaming(&self) -> bool;

    /// Register a consumer for every reading
    fn add_callback(&self, callback: ReadingCallback);

    /// Open the link: `CONNECTING -> CONNECTED`, or `ERROR` on failure
    fn connect(&self) -> Result<()>;

    /// Close the link; always succeeds and leaves the driver `DISCONNECTED`
    fn disconnect(&self) -> Result<()>;

    /// Start the sampling loop; requires `CONNECTED`
    fn start_streaming(&self) -> Result<()>;

    /// Stop the sampling loop and return to `CONNECTED`; requires `STREAMING`
    fn stop_streaming(&self) -> Result<()>;

    /// Run the device calibration; requires `CONNECTED`
    fn calibrate(&self) -> Result<()>;

    /// Decode a chunk into quality-assessed readings; never fails
    fn parse_data(&self, raw: &[u8]) -> Vec<SensorReading>;

    /// (readings delivered, streaming errors)
    fn stats(&self) -> (u64, u64);
}

/// Call `f`, logging instead of unwinding into the caller if it panics
pub fn invoke_guarded(context: &str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        log::error!("{}: callback panicked, continuing", context);
    }
}

/// State common to all drivers: status, streaming flag, callbacks, counters
pub struct DriverCore {
    config: SensorConfig,
    calibration: Option<CalibrationModel>,
    status: Mutex<SensorStatus>,
    streaming: AtomicBool,
    callbacks: RwLock<Vec<ReadingCallback>>,
    reading_count: AtomicU64,
    error_count: AtomicU64,
}

impl DriverCore {
    pub fn new(config: SensorConfig) -> Self {
        let calibration = CalibrationModel::from_params(&config.calibration_params);
        Self {
            config,
            calibration,
            status: Mutex::new(SensorStatus::Disconnected),
            streaming: AtomicBool::new(false),
            callbacks: RwLock::new(Vec::new()),
            reading_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    pub fn device_id(&self) -> &str {
        &self.config.device_id
    }

    pub fn status(&self) -> SensorStatus {
        *self.status.lock()
    }

    pub fn set_status(&self, status: SensorStatus) {
        let previous = std::mem::replace(&mut *self.status.lock(), status);
        if previous != status {
            log::debug!("{}: {} -> {}", self.config.device_id, previous, status);
        }
    }

    /// Move `from -> to` only if the status is still `from`
    pub fn transition(&self, from: SensorStatus, to: SensorStatus) -> bool {
        let mut status = self.status.lock();
        if *status == from {
            *status = to;
            log::debug!("{}: {} -> {}", self.config.device_id, from, to);
            true
        } else {
            false
        }
    }

    /// Atomically move `from -> to` for `operation`, or reject it with the
    /// status observed under the same lock
    pub fn enter(
        &self,
        operation: &'static str,
        from: SensorStatus,
        to: SensorStatus,
    ) -> Result<()> {
        let mut status = self.status.lock();
        if *status != from {
            let current = *status;
            drop(status);
            log::warn!(
                "{}: cannot {} while {}",
                self.config.device_id,
                operation,
                current
            );
            return Err(Error::InvalidState {
                operation,
                status: current,
            });
        }
        *status = to;
        log::debug!("{}: {} -> {}", self.config.device_id, from, to);
        Ok(())
    }

    /// Reject `operation` unless the driver is in `expected`; status is untouched
    pub fn require(&self, operation: &'static str, expected: SensorStatus) -> Result<()> {
        let status = self.status();
        if status == expected {
            Ok(())
        } else {
            log::warn!(
                "{}: cannot {} while {}",
                self.config.device_id,
                operation,
                status
            );
            Err(Error::InvalidState { operation, status })
        }
    }

    /// Reject `connect` on an already open link
    pub fn require_closed(&self) -> Result<()> {
        match self.status() {
            SensorStatus::Disconnected | SensorStatus::Error => Ok(()),
            status => {
                log::warn!("{}: cannot connect while {}", self.config.device_id, status);
                Err(Error::InvalidState {
                    operation: "connect",
                    status,
                })
            }
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    pub fn set_streaming(&self, streaming: bool) {
        self.streaming.store(streaming, Ordering::Release);
    }

    pub fn add_callback(&self, callback: ReadingCallback) {
        self.callbacks.write().push(callback);
    }

    /// Turn a decoded sample into a reading: quality first, then calibration
    pub fn build_reading(&self, sample: Sample) -> SensorReading {
        let mut reading = SensorReading::assessed(
            sample.timestamp,
            &self.config.device_id,
            &sample.sensor_type,
            sample.value,
            sample.metadata,
            &self.config.quality_thresholds,
        );
        if let Some(model) = &self.calibration {
            reading.processed_value = Some(model.apply(&reading.raw_value));
        }
        reading
    }

    /// Decode with the configured format; failures log and yield nothing
    pub fn parse(&self, raw: &[u8]) -> Vec<SensorReading> {
        match codec::decode(self.config.data_format, raw) {
            Ok(samples) => samples.into_iter().map(|s| self.build_reading(s)).collect(),
            Err(e) => {
                log::warn!(
                    "{}: dropping {}-byte chunk: {}",
                    self.config.device_id,
                    raw.len(),
                    e
                );
                Vec::new()
            }
        }
    }

    /// Deliver a reading to every callback in registration order
    pub fn emit(&self, reading: &SensorReading) {
        let callbacks = self.callbacks.read().clone();
        for callback in &callbacks {
            invoke_guarded(&self.config.device_id, || callback(reading));
        }
        let count = self.reading_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count % 10_000 == 0 {
            log::debug!(
                "{}: {} readings, {} errors",
                self.config.device_id,
                count,
                self.error_count.load(Ordering::Relaxed)
            );
        }
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> (u64, u64) {
        (
            self.reading_count.load(Ordering::Relaxed),
            self.error_count.load(Ordering::Relaxed),
        )
    }
}
