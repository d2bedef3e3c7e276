//! Sensor registry and orchestrator
//!
//! Owns one driver per `device_id`, fans bulk lifecycle operations out to
//! the drivers in parallel, and dispatches every reading to the registered
//! data handlers.
//!
//! # Thread Model
//!
//! ```text
//! connect_all() ──▶ thread::scope
//!                    ├─ connect-<id a> ─▶ driver a.connect()
//!                    ├─ connect-<id b> ─▶ driver b.connect()
//!                    └─ ...             (joined before returning)
//!
//! sensor-<id> / mock-<id> ──▶ Dispatcher::dispatch ──▶ history, recording,
//!                                                     data handlers
//! ```
//!
//! Bulk operations snapshot the eligible drivers before spawning, so the
//! result map holds exactly the devices that were eligible at call time.

mod dispatch;

pub use dispatch::{DataHandler, HandlerId};

use crate::core::driver::SensorDriver;
use crate::core::quality::{WindowReport, assess_window};
use crate::core::types::{SensorConfig, SensorReading, SensorStatus, StatusInfo};
use crate::devices::{create_driver, transport_resource};
use crate::error::{Error, Result};
use chrono::Utc;
use dispatch::Dispatcher;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Manager tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Readings kept per device for `get_sensor_data`; 0 disables history
    pub history_capacity: usize,
    /// Connect every configured sensor at daemon startup
    pub auto_connect: bool,
    /// Start streaming after a successful auto-connect
    pub auto_stream: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            history_capacity: 10_000,
            auto_connect: true,
            auto_stream: true,
        }
    }
}

/// Registry of drivers keyed by `device_id`
pub struct SensorManager {
    sensors: RwLock<HashMap<String, Arc<dyn SensorDriver>>>,
    dispatcher: Arc<Dispatcher>,
}

impl SensorManager {
    pub fn new() -> Self {
        Self::with_config(&ManagerConfig::default())
    }

    pub fn with_config(config: &ManagerConfig) -> Self {
        Self {
            sensors: RwLock::new(HashMap::new()),
            dispatcher: Arc::new(Dispatcher::new(config.history_capacity)),
        }
    }

    /// Build, wire and store the driver for `config`
    ///
    /// An existing entry with the same id is replaced; the replaced driver
    /// is disconnected before it is dropped. A descriptor whose transport
    /// is already owned by another device is rejected.
    pub fn register_sensor(&self, config: SensorConfig) -> Result<()> {
        let device_id = config.device_id.clone();
        let driver = create_driver(config).inspect_err(|e| {
            log::error!("Failed to register {}: {}", device_id, e);
        })?;

        let dispatcher = Arc::clone(&self.dispatcher);
        driver.add_callback(Arc::new(move |reading: &SensorReading| {
            dispatcher.dispatch(reading)
        }));

        let resource = transport_resource(driver.config());
        let mut sensors = self.sensors.write();
        if let Some(resource) = resource
            && let Some(owner) = sensors.values().find(|other| {
                other.config().device_id != device_id
                    && transport_resource(other.config()).as_deref() == Some(resource.as_str())
            })
        {
            let owner = owner.config().device_id.clone();
            drop(sensors);
            log::error!("Failed to register {}: {} is used by {}", device_id, resource, owner);
            return Err(Error::InvalidConfig(format!(
                "{}: transport {} is already used by {}",
                device_id, resource, owner
            )));
        }

        self.dispatcher.track(&device_id);
        let replaced = sensors.insert(device_id.clone(), driver);
        drop(sensors);

        if let Some(old) = replaced {
            log::info!("Re-registered {}, disconnecting previous driver", device_id);
            if let Err(e) = old.disconnect() {
                log::warn!("{}: replaced driver failed to disconnect: {}", device_id, e);
            }
        } else {
            log::info!("Registered sensor {}", device_id);
        }
        Ok(())
    }

    /// Disconnect the driver, then drop it and its history
    pub fn unregister_sensor(&self, device_id: &str) -> Result<()> {
        let driver = self
            .get_sensor(device_id)
            .ok_or_else(|| Error::UnknownDevice(device_id.to_string()))?;

        if let Err(e) = driver.disconnect() {
            log::warn!("{}: disconnect during unregister failed: {}", device_id, e);
        }

        let mut sensors = self.sensors.write();
        // A concurrent re-register may have replaced the entry meanwhile
        if sensors
            .get(device_id)
            .is_some_and(|current| Arc::ptr_eq(current, &driver))
        {
            sensors.remove(device_id);
            drop(sensors);
            self.dispatcher.forget(device_id);
            log::info!("Unregistered sensor {}", device_id);
        }
        Ok(())
    }

    pub fn get_sensor(&self, device_id: &str) -> Option<Arc<dyn SensorDriver>> {
        self.sensors.read().get(device_id).cloned()
    }

    pub fn sensor_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sensors.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sensors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.read().is_empty()
    }

    /// Connect every device that is `DISCONNECTED` or in `ERROR`
    pub fn connect_all(&self) -> HashMap<String, bool> {
        self.fan_out(
            "connect",
            |s| matches!(s, SensorStatus::Disconnected | SensorStatus::Error),
            |d| d.connect(),
        )
    }

    /// Disconnect every registered device
    pub fn disconnect_all(&self) -> HashMap<String, bool> {
        self.fan_out("disconnect", |_| true, |d| d.disconnect())
    }

    /// Start streaming on every `CONNECTED` device
    pub fn start_all_streaming(&self) -> HashMap<String, bool> {
        self.fan_out(
            "stream",
            |s| s == SensorStatus::Connected,
            |d| d.start_streaming(),
        )
    }

    /// Stop streaming on every `STREAMING` device
    pub fn stop_all_streaming(&self) -> HashMap<String, bool> {
        self.fan_out(
            "unstream",
            |s| s == SensorStatus::Streaming,
            |d| d.stop_streaming(),
        )
    }

    /// Calibrate every `CONNECTED` device
    pub fn calibrate_all(&self) -> HashMap<String, bool> {
        self.fan_out(
            "calibrate",
            |s| s == SensorStatus::Connected,
            |d| d.calibrate(),
        )
    }

    pub fn get_sensor_status(&self) -> HashMap<String, StatusInfo> {
        self.sensors
            .read()
            .iter()
            .map(|(id, driver)| {
                let config = driver.config();
                let info = StatusInfo {
                    status: driver.status(),
                    device_name: config.device_name.clone(),
                    connection_type: config.connection_type,
                    sampling_rate: config.sampling_rate,
                    is_streaming: driver.is_streaming(),
                };
                (id.clone(), info)
            })
            .collect()
    }

    /// Register a consumer for every reading from every device
    ///
    /// Handlers run synchronously on the producing device's thread, in
    /// registration order. Hand off to a queue for anything slow.
    pub fn add_data_handler(&self, handler: DataHandler) -> HandlerId {
        let id = self.dispatcher.add_handler(handler);
        log::debug!("Added data {}", id);
        id
    }

    pub fn remove_data_handler(&self, id: HandlerId) -> bool {
        let removed = self.dispatcher.remove_handler(id);
        if removed {
            log::debug!("Removed data {}", id);
        }
        removed
    }

    pub fn start_recording(&self) {
        self.dispatcher.start_recording();
        log::info!("Recording started");
    }

    /// End the session and return its readings in dispatch order
    pub fn stop_recording(&self) -> Vec<SensorReading> {
        let readings = self.dispatcher.stop_recording();
        log::info!("Recording stopped ({} readings)", readings.len());
        readings
    }

    pub fn is_recording(&self) -> bool {
        self.dispatcher.is_recording()
    }

    /// Readings from `device_id` captured within `window` of now, oldest first
    pub fn get_sensor_data(&self, device_id: &str, window: Duration) -> Vec<SensorReading> {
        let cutoff = chrono::Duration::from_std(window)
            .ok()
            .and_then(|w| Utc::now().checked_sub_signed(w));
        self.dispatcher
            .history_where(device_id, |r| cutoff.is_none_or(|c| r.timestamp >= c))
    }

    /// Window statistics over the device's recent readings
    ///
    /// Sequence readings contribute every element. `None` for unknown devices.
    pub fn quality_report(&self, device_id: &str, window: Duration) -> Option<WindowReport> {
        if !self.sensors.read().contains_key(device_id) {
            return None;
        }
        let samples: Vec<f64> = self
            .get_sensor_data(device_id, window)
            .iter()
            .flat_map(|r| r.raw_value.values().iter().copied())
            .collect();
        Some(assess_window(&samples))
    }

    /// Stop streaming and disconnect every device
    pub fn shutdown(&self) {
        if self.is_empty() {
            return;
        }
        log::info!("Shutting down {} sensors", self.len());
        self.stop_all_streaming();
        let results = self.disconnect_all();
        let failed = results.values().filter(|ok| !**ok).count();
        if failed > 0 {
            log::warn!("{} sensors failed to disconnect cleanly", failed);
        }
    }

    /// Run `operation` on every eligible driver concurrently
    fn fan_out<E, F>(&self, name: &'static str, eligible: E, operation: F) -> HashMap<String, bool>
    where
        E: Fn(SensorStatus) -> bool,
        F: Fn(&dyn SensorDriver) -> Result<()> + Sync,
    {
        let targets: Vec<(String, Arc<dyn SensorDriver>)> = self
            .sensors
            .read()
            .iter()
            .filter(|(_, driver)| eligible(driver.status()))
            .map(|(id, driver)| (id.clone(), Arc::clone(driver)))
            .collect();

        if targets.is_empty() {
            return HashMap::new();
        }

        let operation = &operation;
        let results: HashMap<String, bool> = thread::scope(|scope| {
            let mut pending = Vec::with_capacity(targets.len());
            for (id, driver) in &targets {
                let spawned = thread::Builder::new()
                    .name(format!("{}-{}", name, id))
                    .spawn_scoped(scope, move || operation(driver.as_ref()).is_ok());
                match spawned {
                    Ok(handle) => pending.push((id.clone(), Some(handle), false)),
                    Err(e) => {
                        log::warn!("{}: {} running inline ({})", id, name, e);
                        let ok = operation(driver.as_ref()).is_ok();
                        pending.push((id.clone(), None, ok));
                    }
                }
            }

            pending
                .into_iter()
                .map(|(id, handle, inline_ok)| {
                    let ok = match handle {
                        Some(handle) => handle.join().unwrap_or_else(|_| {
                            log::error!("{}: {} panicked", id, name);
                            false
                        }),
                        None => inline_ok,
                    };
                    (id, ok)
                })
                .collect()
        });

        let succeeded = results.values().filter(|ok| **ok).count();
        log::info!("{}: {}/{} succeeded", name, succeeded, results.len());
        results
    }
}

impl Default for SensorManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SensorManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ConnectionType, DataFormat};

    fn mock(id: &str) -> SensorConfig {
        SensorConfig::new(id, id, ConnectionType::Mock, DataFormat::Mock, 500)
            .with_param("seed", 1)
            .with_calibration("duration", 0.0)
    }

    #[test]
    fn test_register_and_unregister() {
        let manager = SensorManager::new();
        manager.register_sensor(mock("a")).unwrap();
        manager.register_sensor(mock("b")).unwrap();
        assert_eq!(manager.sensor_ids(), vec!["a", "b"]);

        manager.unregister_sensor("a").unwrap();
        assert!(manager.get_sensor("a").is_none());
        assert!(matches!(
            manager.unregister_sensor("a"),
            Err(Error::UnknownDevice(_))
        ));
    }

    #[test]
    fn test_invalid_config_is_not_registered() {
        let manager = SensorManager::new();
        let bad = SensorConfig::new("x", "x", ConnectionType::Serial, DataFormat::Mock, 10);
        assert!(manager.register_sensor(bad).is_err());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_shared_transport_is_rejected() {
        let manager = SensorManager::new();
        let glove = |id: &str, mac: &str| {
            SensorConfig::new(id, id, ConnectionType::Bluetooth, DataFormat::Json, 500)
                .with_param("mac_address", mac)
        };
        manager
            .register_sensor(glove("left", "00:11:22:33:44:55"))
            .unwrap();
        manager
            .register_sensor(glove("right", "00:11:22:33:44:66"))
            .unwrap();
        assert!(matches!(
            manager.register_sensor(glove("spare", "00-11-22-33-44-55")),
            Err(Error::InvalidConfig(_))
        ));
        assert!(manager.get_sensor("spare").is_none());

        // Same id may be re-registered on its own transport
        manager
            .register_sensor(glove("left", "00:11:22:33:44:55"))
            .unwrap();

        let port = |id: &str| {
            SensorConfig::new(id, id, ConnectionType::Serial, DataFormat::AsciiCsv, 100)
                .with_param("port", "/dev/ttyACM0")
        };
        manager.register_sensor(port("palm")).unwrap();
        assert!(manager.register_sensor(port("wrist")).is_err());
        assert_eq!(manager.len(), 3);
    }

    #[test]
    fn test_reregister_replaces_and_disconnects() {
        let manager = SensorManager::new();
        manager.register_sensor(mock("a")).unwrap();
        manager.connect_all();
        let old = manager.get_sensor("a").unwrap();
        assert_eq!(old.status(), SensorStatus::Connected);

        manager
            .register_sensor(mock("a").with_param("pulse_rate", 90.0))
            .unwrap();
        assert_eq!(manager.len(), 1);
        assert_eq!(old.status(), SensorStatus::Disconnected);
        let new = manager.get_sensor("a").unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(new.config().param_f64("pulse_rate"), Some(90.0));
    }

    #[test]
    fn test_bulk_results_cover_only_eligible_devices() {
        let manager = SensorManager::new();
        manager.register_sensor(mock("a")).unwrap();
        manager.register_sensor(mock("b")).unwrap();

        assert!(manager.start_all_streaming().is_empty());

        let connected = manager.connect_all();
        assert_eq!(connected.len(), 2);
        assert!(connected.values().all(|ok| *ok));

        manager.get_sensor("b").unwrap().start_streaming().unwrap();
        let started = manager.start_all_streaming();
        assert_eq!(started.keys().collect::<Vec<_>>(), vec!["a"]);

        let stopped = manager.stop_all_streaming();
        assert_eq!(stopped.len(), 2);

        let calibrated = manager.calibrate_all();
        assert_eq!(calibrated.len(), 2);
        assert!(calibrated.values().all(|ok| *ok));

        assert_eq!(manager.disconnect_all().len(), 2);
    }

    #[test]
    fn test_status_snapshot() {
        let manager = SensorManager::new();
        manager.register_sensor(mock("a")).unwrap();
        let status = manager.get_sensor_status();
        let info = &status["a"];
        assert_eq!(info.status, SensorStatus::Disconnected);
        assert_eq!(info.connection_type, ConnectionType::Mock);
        assert_eq!(info.sampling_rate, 500);
        assert!(!info.is_streaming);
    }

    #[test]
    fn test_quality_report_unknown_device() {
        let manager = SensorManager::new();
        assert!(
            manager
                .quality_report("nope", Duration::from_secs(1))
                .is_none()
        );
        assert!(
            manager
                .get_sensor_data("nope", Duration::from_secs(1))
                .is_empty()
        );
    }
}
