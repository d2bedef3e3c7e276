//! Serial / USB-CDC sensor driver
//!
//! Devices stream continuously once the port is open, so streaming needs no
//! start or stop command. Calibration writes `CAL\n`.
//!
//! # Connection parameters
//!
//! | Key          | Default        |
//! |--------------|----------------|
//! | `port`       | `/dev/ttyUSB0` |
//! | `baudrate`   | `115200`       |
//! | `timeout_ms` | `10`           |

use super::link::{CommandSet, TransportLink, link_driver};
use crate::core::types::SensorConfig;
use crate::error::{Error, Result};
use crate::transport::{Connector, SerialTransport, Transport};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUDRATE: u32 = 115_200;
const DEFAULT_TIMEOUT_MS: u64 = 10;

const COMMANDS: CommandSet = CommandSet {
    start: None,
    stop: None,
    calibrate: b"CAL\n",
};

/// Driver for sensors on a UART or USB serial port
pub struct SerialDriver {
    link: TransportLink,
}

impl SerialDriver {
    pub fn new(config: SensorConfig) -> Self {
        Self::with_connector(config, Arc::new(open_port))
    }

    /// Use `connector` instead of opening a real port
    pub fn with_connector(config: SensorConfig, connector: Connector) -> Self {
        Self {
            link: TransportLink::new(config, connector, COMMANDS),
        }
    }
}

link_driver!(SerialDriver);

fn open_port(config: &SensorConfig) -> Result<Box<dyn Transport>> {
    let port = config.param_str("port").unwrap_or(DEFAULT_PORT);
    let baudrate = match config.param_u64("baudrate") {
        Some(b) => u32::try_from(b)
            .map_err(|_| Error::InvalidConfig(format!("{}: baudrate {} out of range", config.device_id, b)))?,
        None => DEFAULT_BAUDRATE,
    };
    let timeout = Duration::from_millis(config.param_u64("timeout_ms").unwrap_or(DEFAULT_TIMEOUT_MS));

    Ok(Box::new(SerialTransport::open(port, baudrate, timeout)?))
}
