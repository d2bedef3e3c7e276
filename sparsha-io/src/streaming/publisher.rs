//! Reading publisher over TCP
//!
//! Device threads hand readings to a bounded lock-free queue via the data
//! handler returned by [`ReadingPublisher::handler`]; `try_push` never
//! blocks, and overflow drops the newest message. A dedicated
//! `reading-publisher` thread owns the listener, accepts clients and writes
//! newline-delimited JSON to each of them.

use crate::error::{Error, Result};
use crate::manager::DataHandler;
use crate::core::types::SensorReading;
use crate::streaming::messages::ReadingMessage;
use crossbeam_queue::ArrayQueue;
use log::{debug, error, info, warn};
use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Messages written per loop iteration before accepting new clients again
const BATCH_LIMIT: usize = 200;
const IDLE_SLEEP: Duration = Duration::from_millis(5);
const CLIENT_WRITE_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    dropped: AtomicU64,
    clients: AtomicU64,
}

/// Broadcasts every reading to connected TCP clients
pub struct ReadingPublisher {
    queue: Arc<ArrayQueue<ReadingMessage>>,
    counters: Arc<Counters>,
    local_addr: SocketAddr,
    publisher_thread: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl ReadingPublisher {
    /// Bind `bind_address` and start the publisher thread
    ///
    /// `queue_capacity` bounds how many readings may wait for the publisher
    /// thread; 1000 is about one second at 1 kHz.
    pub fn new(bind_address: &str, queue_capacity: usize) -> Result<Self> {
        if queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "streaming.queue_capacity must be greater than zero".into(),
            ));
        }

        let listener = TcpListener::bind(bind_address)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let queue = Arc::new(ArrayQueue::new(queue_capacity));
        let counters = Arc::new(Counters::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_queue = Arc::clone(&queue);
        let thread_counters = Arc::clone(&counters);
        let thread_shutdown = Arc::clone(&shutdown);
        let publisher_thread = thread::Builder::new()
            .name("reading-publisher".to_string())
            .spawn(move || {
                publisher_loop(listener, thread_queue, thread_counters, thread_shutdown)
            })
            .map_err(|e| Error::ThreadSpawn(e.to_string()))?;

        info!("Reading publisher listening on {}", local_addr);

        Ok(Self {
            queue,
            counters,
            local_addr,
            publisher_thread: Some(publisher_thread),
            shutdown,
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Data handler that enqueues readings for broadcast
    pub fn handler(&self) -> DataHandler {
        let queue = Arc::clone(&self.queue);
        let counters = Arc::clone(&self.counters);
        Arc::new(move |reading: &SensorReading| {
            if queue.push(ReadingMessage::from(reading)).is_err() {
                let dropped = counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % 1000 == 1 {
                    warn!("Publisher queue full, {} readings dropped", dropped);
                }
            }
        })
    }

    pub fn published(&self) -> u64 {
        self.counters.published.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    pub fn client_count(&self) -> u64 {
        self.counters.clients.load(Ordering::Relaxed)
    }

    /// Stop the publisher thread and close all clients
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.publisher_thread.take()
            && handle.join().is_err()
        {
            error!("Publisher thread panicked");
        }
    }
}

impl Drop for ReadingPublisher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn publisher_loop(
    listener: TcpListener,
    queue: Arc<ArrayQueue<ReadingMessage>>,
    counters: Arc<Counters>,
    shutdown: Arc<AtomicBool>,
) {
    let mut clients: Vec<(SocketAddr, TcpStream)> = Vec::new();
    let mut line = Vec::with_capacity(512);

    while !shutdown.load(Ordering::Relaxed) {
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = prepare_client(&stream) {
                        warn!("Rejecting client {}: {}", addr, e);
                        continue;
                    }
                    info!("Stream client connected: {}", addr);
                    clients.push((addr, stream));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("Error accepting stream client: {}", e);
                    break;
                }
            }
        }
        counters
            .clients
            .store(clients.len() as u64, Ordering::Relaxed);

        let mut batch = 0;
        while batch < BATCH_LIMIT
            && let Some(message) = queue.pop()
        {
            batch += 1;
            line.clear();
            if let Err(e) = serde_json::to_writer(&mut line, &message) {
                debug!("Failed to serialize reading: {}", e);
                continue;
            }
            line.push(b'\n');

            clients.retain_mut(|(addr, stream)| match stream.write_all(&line) {
                Ok(()) => true,
                Err(e) => {
                    info!("Stream client {} dropped: {}", addr, e);
                    false
                }
            });
            counters.published.fetch_add(1, Ordering::Relaxed);
        }

        if batch == 0 {
            thread::sleep(IDLE_SLEEP);
        }
    }

    info!(
        "Publisher thread exiting ({} published, {} dropped)",
        counters.published.load(Ordering::Relaxed),
        counters.dropped.load(Ordering::Relaxed)
    );
}

fn prepare_client(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_write_timeout(Some(CLIENT_WRITE_TIMEOUT))?;
    stream.set_nodelay(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{QualityThresholds, RawValue};
    use chrono::Utc;
    use serde_json::Map;
    use std::io::{BufRead, BufReader};

    fn reading(value: f64) -> SensorReading {
        SensorReading::assessed(
            Utc::now(),
            "dev",
            "pressure",
            RawValue::Scalar(value),
            Map::new(),
            &QualityThresholds::default(),
        )
    }

    #[test]
    fn test_client_receives_json_lines() {
        let publisher = ReadingPublisher::new("127.0.0.1:0", 16).unwrap();
        let client = TcpStream::connect(publisher.local_addr()).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        // Wait for the publisher thread to accept
        for _ in 0..200 {
            if publisher.client_count() == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(publisher.client_count(), 1);

        let handler = publisher.handler();
        handler(&reading(42.0));

        let mut line = String::new();
        BufReader::new(client).read_line(&mut line).unwrap();
        let message: ReadingMessage = serde_json::from_str(&line).unwrap();
        assert_eq!(message.kind, "sensor_data");
        assert_eq!(message.value, RawValue::Scalar(42.0));
    }

    #[test]
    fn test_overflow_is_counted() {
        let mut publisher = ReadingPublisher::new("127.0.0.1:0", 1).unwrap();
        publisher.shutdown();

        let handler = publisher.handler();
        handler(&reading(1.0));
        handler(&reading(2.0));
        handler(&reading(3.0));
        assert_eq!(publisher.dropped(), 2);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            ReadingPublisher::new("127.0.0.1:0", 0),
            Err(Error::InvalidConfig(_))
        ));
    }
}
