//! Transport layer for device I/O
//!
//! Hardware drivers never touch ports or sockets directly; they read and
//! write through a [`Transport`] obtained from a [`Connector`]. Swapping the
//! connector is how drivers are exercised without hardware.

use crate::core::types::SensorConfig;
use crate::error::Result;
use std::sync::Arc;

mod mock;
mod serial;
mod tcp;

pub use mock::MockTransport;
pub use serial::SerialTransport;
pub use tcp::TcpTransport;

/// Transport trait for device communication
pub trait Transport: Send {
    /// Read available data into buffer, returns number of bytes read
    ///
    /// A read timeout is not an error and returns `Ok(0)`.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Check if data is available to read
    fn available(&mut self) -> Result<usize> {
        Ok(0)
    }

    /// Write the whole buffer and flush
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < data.len() {
            let written = self.write(&data[offset..])?;
            if written == 0 {
                return Err(crate::error::Error::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "transport accepted no bytes",
                )));
            }
            offset += written;
        }
        self.flush()
    }
}

/// Opens a transport for a device descriptor
pub type Connector = Arc<dyn Fn(&SensorConfig) -> Result<Box<dyn Transport>> + Send + Sync>;
