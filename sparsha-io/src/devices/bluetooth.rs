//! Bluetooth SPP sensor driver
//!
//! The device is reached through an RFCOMM TTY bound to its MAC address
//! (`rfcomm bind <n> <mac> <channel>`), so the byte stream travels over the
//! same serial transport as wired sensors. Without an explicit
//! `rfcomm_device` the TTY is found by matching `mac_address` (and
//! `channel`, when given) against the bindings the kernel exposes under
//! `/sys/class/tty/rfcomm*`.
//!
//! Commands: `START\n`, `STOP\n`, `CALIBRATE\n`.

use super::link::{CommandSet, TransportLink, link_driver};
use crate::core::types::SensorConfig;
use crate::error::{Error, Result};
use crate::transport::{Connector, SerialTransport, Transport};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const TTY_CLASS_DIR: &str = "/sys/class/tty";
/// RFCOMM ignores the line rate; any valid value works
const RFCOMM_BAUDRATE: u32 = 115_200;
const READ_TIMEOUT: Duration = Duration::from_millis(50);

const COMMANDS: CommandSet = CommandSet {
    start: Some(b"START\n"),
    stop: Some(b"STOP\n"),
    calibrate: b"CALIBRATE\n",
};

/// Driver for Bluetooth serial-profile sensors
pub struct BluetoothDriver {
    link: TransportLink,
}

impl BluetoothDriver {
    pub fn new(config: SensorConfig) -> Self {
        Self::with_connector(config, Arc::new(open_rfcomm))
    }

    pub fn with_connector(config: SensorConfig, connector: Connector) -> Self {
        Self {
            link: TransportLink::new(config, connector, COMMANDS),
        }
    }
}

link_driver!(BluetoothDriver);

/// Check `AA:BB:CC:DD:EE:FF` form (either case, `:` or `-` separated)
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split([':', '-']).collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Canonical `AA:BB:CC:DD:EE:FF` spelling
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().replace('-', ":").to_ascii_uppercase()
}

/// Find the `/dev/rfcommN` bound to `mac` (and `channel`, if given)
///
/// `class_dir` is a sysfs TTY class directory whose `rfcomm*` entries carry
/// `address` and `channel` attributes.
pub fn find_bound_tty(class_dir: &Path, mac: &str, channel: Option<u64>) -> Result<Option<PathBuf>> {
    let wanted = normalize_mac(mac);
    let mut names: Vec<String> = fs::read_dir(class_dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with("rfcomm"))
        .collect();
    names.sort();

    for name in names {
        let entry = class_dir.join(&name);
        let Ok(address) = fs::read_to_string(entry.join("address")) else {
            continue;
        };
        if normalize_mac(&address) != wanted {
            continue;
        }
        if let Some(channel) = channel {
            let bound = fs::read_to_string(entry.join("channel"))
                .ok()
                .and_then(|c| c.trim().parse::<u64>().ok());
            if bound != Some(channel) {
                log::debug!("{} is bound to {} on channel {:?}", name, wanted, bound);
                continue;
            }
        }
        return Ok(Some(Path::new("/dev").join(name)));
    }
    Ok(None)
}

/// The validated MAC of a Bluetooth descriptor
fn mac_address(config: &SensorConfig) -> Result<&str> {
    let mac = config.param_str("mac_address").ok_or_else(|| {
        Error::InvalidConfig(format!("{}: mac_address is required", config.device_id))
    })?;
    if !is_valid_mac(mac) {
        return Err(Error::InvalidConfig(format!(
            "{}: malformed mac_address {:?}",
            config.device_id, mac
        )));
    }
    Ok(mac)
}

fn open_rfcomm(config: &SensorConfig) -> Result<Box<dyn Transport>> {
    let mac = mac_address(config)?;
    let device = match config.param_str("rfcomm_device") {
        Some(device) => PathBuf::from(device),
        None => find_bound_tty(Path::new(TTY_CLASS_DIR), mac, config.param_u64("channel"))?
            .ok_or_else(|| {
                Error::Other(format!(
                    "no RFCOMM TTY bound to {} (rfcomm bind <n> {} <channel>)",
                    mac, mac
                ))
            })?,
    };

    log::info!("{}: opening {} for {}", config.device_id, device.display(), mac);
    Ok(Box::new(SerialTransport::open(
        &device.to_string_lossy(),
        RFCOMM_BAUDRATE,
        READ_TIMEOUT,
    )?))
}
