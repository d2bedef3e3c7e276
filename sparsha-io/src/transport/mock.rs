//! In-memory transport for exercising drivers without hardware

use super::Transport;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Shared-buffer transport
///
/// Clones share the same buffers: keep one clone to inject device output
/// and inspect commands while the driver owns the other.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    fail_reads: bool,
    hung_up: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the driver to read
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    /// Everything the driver has written so far
    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.clone()
    }

    /// Written bytes as text, for command assertions
    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().write_buffer).into_owned()
    }

    pub fn clear_written(&self) {
        self.inner.lock().write_buffer.clear();
    }

    /// Make subsequent reads fail with a transient I/O error
    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.lock().fail_reads = fail;
    }

    /// Simulate the device closing its end: reads report end of stream
    pub fn hang_up(&self) {
        self.inner.lock().hung_up = true;
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.hung_up {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "device hung up",
            )));
        }
        if inner.fail_reads {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                "injected read failure",
            )));
        }
        let count = inner.read_buffer.len().min(buffer.len());
        for (slot, byte) in buffer.iter_mut().zip(inner.read_buffer.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.inner.lock().write_buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        Ok(self.inner.lock().read_buffer.len())
    }
}
