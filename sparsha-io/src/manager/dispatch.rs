//! Reading fan-out shared by every registered driver
//!
//! One `Dispatcher` is installed as a callback on each driver. For every
//! reading it appends to the device's history ring, to the recording buffer
//! when a session is active, and then calls every data handler in
//! registration order on the producing thread.

use crate::core::driver::invoke_guarded;
use crate::core::types::SensorReading;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Consumer invoked for every reading from every device
pub type DataHandler = Arc<dyn Fn(&SensorReading) + Send + Sync>;

/// Token returned by `add_data_handler`, used to remove the handler again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

type HandlerList = Arc<Vec<(HandlerId, DataHandler)>>;
type History = Arc<Mutex<VecDeque<SensorReading>>>;

pub(crate) struct Dispatcher {
    /// Copy-on-write: dispatch clones the `Arc`, mutation swaps in a new list
    handlers: RwLock<HandlerList>,
    next_handler: AtomicU64,
    /// `Some` while a recording session is active
    recording: Mutex<Option<Vec<SensorReading>>>,
    history: RwLock<HashMap<String, History>>,
    history_capacity: usize,
}

impl Dispatcher {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            handlers: RwLock::new(Arc::new(Vec::new())),
            next_handler: AtomicU64::new(1),
            recording: Mutex::new(None),
            history: RwLock::new(HashMap::new()),
            history_capacity,
        }
    }

    pub fn dispatch(&self, reading: &SensorReading) {
        if self.history_capacity > 0
            && let Some(ring) = self.history.read().get(&reading.device_id).cloned()
        {
            let mut ring = ring.lock();
            if ring.len() == self.history_capacity {
                ring.pop_front();
            }
            ring.push_back(reading.clone());
        }

        if let Some(buffer) = self.recording.lock().as_mut() {
            buffer.push(reading.clone());
        }

        let handlers = Arc::clone(&self.handlers.read());
        for (id, handler) in handlers.iter() {
            log::trace!("{}: {} -> {}", reading.device_id, reading.quality, id);
            invoke_guarded(&reading.device_id, || handler(reading));
        }
    }

    pub fn add_handler(&self, handler: DataHandler) -> HandlerId {
        let id = HandlerId(self.next_handler.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.handlers.write();
        let mut next = Vec::with_capacity(handlers.len() + 1);
        next.extend(handlers.iter().cloned());
        next.push((id, handler));
        *handlers = Arc::new(next);
        id
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        if !handlers.iter().any(|(existing, _)| *existing == id) {
            return false;
        }
        let next: Vec<_> = handlers
            .iter()
            .filter(|(existing, _)| *existing != id)
            .cloned()
            .collect();
        *handlers = Arc::new(next);
        true
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Begin a session; an active session is discarded and restarted
    pub fn start_recording(&self) {
        let previous = self.recording.lock().replace(Vec::new());
        if let Some(discarded) = previous {
            log::warn!(
                "Recording restarted, discarding {} buffered readings",
                discarded.len()
            );
        }
    }

    /// End the session and hand back everything it captured
    pub fn stop_recording(&self) -> Vec<SensorReading> {
        self.recording.lock().take().unwrap_or_default()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.lock().is_some()
    }

    /// Create the device's history ring if it does not exist yet
    pub fn track(&self, device_id: &str) {
        self.history
            .write()
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())));
    }

    pub fn forget(&self, device_id: &str) {
        self.history.write().remove(device_id);
    }

    /// Readings for `device_id` accepted by `keep`, oldest first
    pub fn history_where(
        &self,
        device_id: &str,
        keep: impl Fn(&SensorReading) -> bool,
    ) -> Vec<SensorReading> {
        let Some(ring) = self.history.read().get(device_id).cloned() else {
            return Vec::new();
        };
        let ring = ring.lock();
        ring.iter().filter(|r| keep(*r)).cloned().collect()
    }
}
