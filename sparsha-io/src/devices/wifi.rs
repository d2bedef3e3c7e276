//! WiFi / Ethernet sensor driver over a TCP client socket
//!
//! Commands: `START_STREAM\n`, `STOP_STREAM\n`, `CALIBRATE\n`.

use super::link::{CommandSet, TransportLink, link_driver};
use crate::core::types::SensorConfig;
use crate::error::{Error, Result};
use crate::transport::{Connector, TcpTransport, Transport};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "192.168.1.100";
pub const DEFAULT_PORT: u16 = 8080;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;
const DEFAULT_READ_TIMEOUT_MS: u64 = 100;

const COMMANDS: CommandSet = CommandSet {
    start: Some(b"START_STREAM\n"),
    stop: Some(b"STOP_STREAM\n"),
    calibrate: b"CALIBRATE\n",
};

/// Driver for network sensors speaking a line/command protocol over TCP
pub struct WifiDriver {
    link: TransportLink,
}

impl WifiDriver {
    pub fn new(config: SensorConfig) -> Self {
        Self::with_connector(config, Arc::new(open_socket))
    }

    pub fn with_connector(config: SensorConfig, connector: Connector) -> Self {
        Self {
            link: TransportLink::new(config, connector, COMMANDS),
        }
    }
}

link_driver!(WifiDriver);

fn open_socket(config: &SensorConfig) -> Result<Box<dyn Transport>> {
    let host = config.param_str("host").unwrap_or(DEFAULT_HOST);
    let port = match config.param_u64("port") {
        Some(p) => u16::try_from(p).map_err(|_| {
            Error::InvalidConfig(format!("{}: port {} out of range", config.device_id, p))
        })?,
        None => DEFAULT_PORT,
    };
    let connect_timeout = Duration::from_millis(
        config
            .param_u64("connect_timeout_ms")
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
    );
    let read_timeout = Duration::from_millis(
        config
            .param_u64("read_timeout_ms")
            .unwrap_or(DEFAULT_READ_TIMEOUT_MS)
            .max(1),
    );

    Ok(Box::new(TcpTransport::connect(
        host,
        port,
        connect_timeout,
        read_timeout,
    )?))
}
