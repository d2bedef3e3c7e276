//! Device driver implementations
//!
//! | Connection           | Driver            | Transport                 |
//! |----------------------|-------------------|---------------------------|
//! | `serial`, `usb`      | [`SerialDriver`]  | serial port               |
//! | `bluetooth`          | [`BluetoothDriver`] | RFCOMM TTY              |
//! | `wifi`, `ethernet`   | [`WifiDriver`]    | TCP client                |
//! | `mock`               | [`MockDriver`]    | in-process generator      |

pub mod bluetooth;
mod link;
pub mod mock;
pub mod serial;
pub mod wifi;

pub use bluetooth::BluetoothDriver;
pub use mock::MockDriver;
pub use serial::SerialDriver;
pub use wifi::WifiDriver;

use crate::core::driver::SensorDriver;
use crate::core::types::{ConnectionType, SensorConfig};
use crate::error::Result;
use std::sync::Arc;

/// The transport a descriptor would open, as a comparable key
///
/// Two registered devices must never resolve to the same key. Generated
/// devices own no transport and yield `None`.
pub fn transport_resource(config: &SensorConfig) -> Option<String> {
    match config.connection_type {
        ConnectionType::Serial | ConnectionType::Usb => Some(
            config
                .param_str("port")
                .unwrap_or(serial::DEFAULT_PORT)
                .to_string(),
        ),
        ConnectionType::Bluetooth => match config.param_str("rfcomm_device") {
            Some(device) => Some(device.to_string()),
            None => config
                .param_str("mac_address")
                .map(|mac| format!("bluetooth:{}", bluetooth::normalize_mac(mac))),
        },
        ConnectionType::Wifi | ConnectionType::Ethernet => Some(format!(
            "tcp:{}:{}",
            config.param_str("host").unwrap_or(wifi::DEFAULT_HOST),
            config.param_u64("port").unwrap_or(u64::from(wifi::DEFAULT_PORT))
        )),
        ConnectionType::Mock => None,
    }
}

/// Build the driver matching `config.connection_type`
///
/// The descriptor is validated first; nothing is opened until `connect`.
pub fn create_driver(config: SensorConfig) -> Result<Arc<dyn SensorDriver>> {
    config.validate()?;

    log::debug!(
        "Creating {} driver for {}",
        config.connection_type,
        config.device_id
    );

    let driver: Arc<dyn SensorDriver> = match config.connection_type {
        ConnectionType::Serial | ConnectionType::Usb => Arc::new(SerialDriver::new(config)),
        ConnectionType::Bluetooth => Arc::new(BluetoothDriver::new(config)),
        ConnectionType::Wifi | ConnectionType::Ethernet => Arc::new(WifiDriver::new(config)),
        ConnectionType::Mock => Arc::new(MockDriver::new(config)),
    };
    Ok(driver)
}
