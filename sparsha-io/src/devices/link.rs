//! Lifecycle shared by transport-backed drivers (serial, Bluetooth, WiFi)
//!
//! # Thread Model
//!
//! ```text
//! ┌──────────────────┐  start_streaming   ┌──────────────────────┐
//! │ caller thread    │ ─────────────────▶ │ sensor-<device_id>   │
//! │ (manager fan-out)│                    │ read -> frame ->     │
//! └──────────────────┘ ◀──── join ─────── │ parse -> emit        │
//!          stop_streaming clears flag     └──────────────────────┘
//! ```
//!
//! The transport mutex is held only for the duration of one read or one
//! command write, so a stop command can interleave with the reader loop.

use crate::codec::FrameBuffer;
use crate::core::driver::DriverCore;
use crate::core::types::{SensorConfig, SensorStatus};
use crate::error::{Error, Result};
use crate::transport::{Connector, Transport};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Bytes requested from the transport per poll
const READ_CHUNK: usize = 4096;
/// Back-off after a failed read
const ERROR_BACKOFF: Duration = Duration::from_millis(10);
/// Consecutive read errors between repeated error logs
const ERROR_LOG_INTERVAL: u64 = 1000;

type SharedTransport = Arc<Mutex<Option<Box<dyn Transport>>>>;

/// Device-side commands for one transport family
#[derive(Debug, Clone, Copy)]
pub(crate) struct CommandSet {
    pub start: Option<&'static [u8]>,
    pub stop: Option<&'static [u8]>,
    pub calibrate: &'static [u8],
}

/// Connection, reader thread and command channel for one device
pub(crate) struct TransportLink {
    core: Arc<DriverCore>,
    connector: Connector,
    transport: SharedTransport,
    reader: Mutex<Option<JoinHandle<()>>>,
    commands: CommandSet,
}

impl TransportLink {
    pub fn new(config: SensorConfig, connector: Connector, commands: CommandSet) -> Self {
        Self {
            core: Arc::new(DriverCore::new(config)),
            connector,
            transport: Arc::new(Mutex::new(None)),
            reader: Mutex::new(None),
            commands,
        }
    }

    pub fn core(&self) -> &DriverCore {
        &self.core
    }

    pub fn connect(&self) -> Result<()> {
        self.core.require_closed()?;
        self.core.set_status(SensorStatus::Connecting);

        let config = self.core.config();
        log::info!(
            "{}: connecting ({} / {})",
            config.device_id,
            config.connection_type,
            config.data_format
        );

        match (self.connector)(config) {
            Ok(transport) => {
                *self.transport.lock() = Some(transport);
                self.core.set_status(SensorStatus::Connected);
                log::info!("{}: connected", config.device_id);
                Ok(())
            }
            Err(e) => {
                self.core.set_status(SensorStatus::Error);
                log::error!("{}: connection failed: {}", config.device_id, e);
                Err(Error::Connection {
                    device_id: config.device_id.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    pub fn disconnect(&self) -> Result<()> {
        if self.core.status() == SensorStatus::Streaming
            && let Err(e) = self.stop_streaming()
        {
            log::warn!("{}: stop before disconnect failed: {}", self.core.device_id(), e);
        }
        self.core.set_streaming(false);
        self.join_reader();

        let was_open = self.transport.lock().take().is_some();
        self.core.set_status(SensorStatus::Disconnected);
        if was_open {
            log::info!("{}: disconnected", self.core.device_id());
        }
        Ok(())
    }

    pub fn start_streaming(&self) -> Result<()> {
        self.core.enter(
            "start streaming",
            SensorStatus::Connected,
            SensorStatus::Streaming,
        )?;
        // Reap a reader that exited on its own after a lost link
        self.join_reader();

        if let Some(command) = self.commands.start
            && let Err(e) = self.send_command(command)
        {
            self.core.set_status(SensorStatus::Error);
            log::error!("{}: start command failed: {}", self.core.device_id(), e);
            return Err(e);
        }

        self.core.set_streaming(true);

        let core = Arc::clone(&self.core);
        let transport = Arc::clone(&self.transport);
        let spawned = thread::Builder::new()
            .name(format!("sensor-{}", self.core.device_id()))
            .spawn(move || reader_loop(core, transport));

        match spawned {
            Ok(handle) => {
                *self.reader.lock() = Some(handle);
                log::info!(
                    "{}: streaming at {} Hz",
                    self.core.device_id(),
                    self.core.config().sampling_rate
                );
                Ok(())
            }
            Err(e) => {
                self.core.set_streaming(false);
                self.core.set_status(SensorStatus::Connected);
                log::error!("{}: failed to spawn reader: {}", self.core.device_id(), e);
                Err(Error::ThreadSpawn(e.to_string()))
            }
        }
    }

    pub fn stop_streaming(&self) -> Result<()> {
        self.core.require("stop streaming", SensorStatus::Streaming)?;

        // Device is told to stop before the loop flag is cleared
        if let Some(command) = self.commands.stop
            && let Err(e) = self.send_command(command)
        {
            log::warn!("{}: stop command failed: {}", self.core.device_id(), e);
        }

        self.core.set_streaming(false);
        self.join_reader();
        self.core.set_status(SensorStatus::Connected);
        log::info!("{}: streaming stopped", self.core.device_id());
        Ok(())
    }

    pub fn calibrate(&self) -> Result<()> {
        self.core
            .enter("calibrate", SensorStatus::Connected, SensorStatus::Calibrating)?;

        let duration = self.core.config().calibration_duration();
        log::info!("{}: calibrating ({:?})", self.core.device_id(), duration);

        if let Err(e) = self.send_command(self.commands.calibrate) {
            self.core.set_status(SensorStatus::Error);
            log::error!("{}: calibration command failed: {}", self.core.device_id(), e);
            return Err(e);
        }

        thread::sleep(duration);

        if self
            .core
            .transition(SensorStatus::Calibrating, SensorStatus::Connected)
        {
            log::info!("{}: calibration complete", self.core.device_id());
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation: "finish calibration",
                status: self.core.status(),
            })
        }
    }

    fn send_command(&self, command: &[u8]) -> Result<()> {
        let mut guard = self.transport.lock();
        let transport = guard.as_mut().ok_or(Error::NotConnected)?;
        transport.send(command)?;
        log::debug!(
            "{}: sent {:?}",
            self.core.device_id(),
            String::from_utf8_lossy(command).trim_end()
        );
        Ok(())
    }

    fn join_reader(&self) {
        let Some(handle) = self.reader.lock().take() else {
            return;
        };
        // Stop requested from inside a callback running on the reader itself
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log::error!("{}: reader thread panicked", self.core.device_id());
        }
    }
}

impl Drop for TransportLink {
    fn drop(&mut self) {
        self.core.set_streaming(false);
        self.join_reader();
    }
}

/// Reader loop: poll, reassemble frames, parse, dispatch
///
/// Transient read errors are counted and retried. A lost link ends the
/// loop and leaves the driver in `Error` until it is reconnected.
fn reader_loop(core: Arc<DriverCore>, transport: SharedTransport) {
    let period = core.config().sample_period();
    let mut frames = FrameBuffer::for_format(core.config().data_format);
    let mut buffer = vec![0u8; READ_CHUNK];
    let mut consecutive_errors = 0u64;

    log::debug!("{}: reader thread started", core.device_id());

    while core.is_streaming() {
        let read = match transport.lock().as_mut() {
            Some(t) => t.read(&mut buffer),
            None => break,
        };

        match read {
            Ok(0) => {}
            Ok(n) => {
                consecutive_errors = 0;
                let complete = frames.push(&buffer[..n]);
                if !complete.is_empty() {
                    for reading in core.parse(&complete) {
                        core.emit(&reading);
                    }
                }
            }
            Err(e) if e.is_link_lost() => {
                core.record_error();
                core.set_streaming(false);
                core.transition(SensorStatus::Streaming, SensorStatus::Error);
                log::error!("{}: link lost: {}", core.device_id(), e);
                break;
            }
            Err(e) => {
                core.record_error();
                if consecutive_errors % ERROR_LOG_INTERVAL == 0 {
                    log::error!("{}: read error: {}", core.device_id(), e);
                }
                consecutive_errors += 1;
                thread::sleep(ERROR_BACKOFF);
                continue;
            }
        }

        thread::sleep(period);
    }

    let (readings, errors) = core.stats();
    log::debug!(
        "{}: reader thread exiting ({} readings, {} errors)",
        core.device_id(),
        readings,
        errors
    );
}

/// Implement [`SensorDriver`](crate::core::driver::SensorDriver) for a
/// driver whose lifecycle lives in a `link: TransportLink` field
macro_rules! link_driver {
    ($driver:ty) => {
        impl $crate::core::driver::SensorDriver for $driver {
            fn config(&self) -> &$crate::core::types::SensorConfig {
                self.link.core().config()
            }

            fn status(&self) -> $crate::core::types::SensorStatus {
                self.link.core().status()
            }

            fn is_streaming(&self) -> bool {
                self.link.core().is_streaming()
            }

            fn add_callback(&self, callback: $crate::core::driver::ReadingCallback) {
                self.link.core().add_callback(callback);
            }

            fn connect(&self) -> $crate::error::Result<()> {
                self.link.connect()
            }

            fn disconnect(&self) -> $crate::error::Result<()> {
                self.link.disconnect()
            }

            fn start_streaming(&self) -> $crate::error::Result<()> {
                self.link.start_streaming()
            }

            fn stop_streaming(&self) -> $crate::error::Result<()> {
                self.link.stop_streaming()
            }

            fn calibrate(&self) -> $crate::error::Result<()> {
                self.link.calibrate()
            }

            fn parse_data(&self, raw: &[u8]) -> Vec<$crate::core::types::SensorReading> {
                self.link.core().parse(raw)
            }

            fn stats(&self) -> (u64, u64) {
                self.link.core().stats()
            }
        }
    };
}

pub(crate) use link_driver;
