//! SparshaIO - Sensor acquisition daemon
//!
//! Registers the configured sensors, optionally connects and starts them,
//! and streams every reading as newline-delimited JSON over TCP until
//! Ctrl-C.

use sparsha_io::config::AppConfig;
use sparsha_io::error::{Error, Result};
use sparsha_io::manager::SensorManager;
use sparsha_io::streaming::ReadingPublisher;
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_CONFIG_PATH: &str = "/etc/sparsha.toml";
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// Parse config path from command line arguments.
///
/// Supports:
/// - `sparsha-io <path>` (positional)
/// - `sparsha-io --config <path>` (flag-based)
/// - `sparsha-io -c <path>` (short flag)
///
/// Defaults to `/etc/sparsha.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    for pair in args.windows(2).skip(1) {
        if pair[0] == "--config" || pair[0] == "-c" {
            return pair[1].clone();
        }
    }

    match args.get(1) {
        Some(arg) if !arg.starts_with('-') => arg.clone(),
        _ => DEFAULT_CONFIG_PATH.to_string(),
    }
}

fn log_status(manager: &SensorManager, publisher: Option<&ReadingPublisher>) {
    let status = manager.get_sensor_status();
    let mut ids: Vec<&String> = status.keys().collect();
    ids.sort();
    for id in ids {
        let info = &status[id];
        let (readings, errors) = manager
            .get_sensor(id)
            .map(|d| d.stats())
            .unwrap_or_default();
        log::info!(
            "{} [{}] {} @ {} Hz: {} readings, {} errors",
            id,
            info.connection_type,
            info.status,
            info.sampling_rate,
            readings,
            errors
        );
    }
    if let Some(publisher) = publisher {
        log::info!(
            "Stream: {} clients, {} published, {} dropped",
            publisher.client_count(),
            publisher.published(),
            publisher.dropped()
        );
    }
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let loaded = AppConfig::load(&config_path)?;
    let using_defaults = loaded.is_none();
    let config = loaded.unwrap_or_default();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("SparshaIO v{} starting...", env!("CARGO_PKG_VERSION"));
    if using_defaults {
        log::warn!(
            "Config {} not found, using built-in defaults",
            config_path
        );
    } else {
        log::info!("Using config: {}", config_path);
    }

    let manager = SensorManager::with_config(&config.manager);
    for sensor in &config.sensors {
        if let Err(e) = manager.register_sensor(sensor.clone()) {
            log::error!("Skipping {}: {}", sensor.device_id, e);
        }
    }
    log::info!("Registered {} sensors", manager.len());

    let publisher = if config.streaming.enabled {
        let publisher = ReadingPublisher::new(
            &config.streaming.bind_address,
            config.streaming.queue_capacity,
        )?;
        manager.add_data_handler(publisher.handler());
        Some(publisher)
    } else {
        log::info!("Reading stream disabled");
        None
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    if config.manager.auto_connect {
        let connected = manager.connect_all();
        let failed: Vec<&String> = connected
            .iter()
            .filter(|(_, ok)| !**ok)
            .map(|(id, _)| id)
            .collect();
        if !failed.is_empty() {
            log::warn!("Failed to connect: {:?}", failed);
        }
        if config.manager.auto_stream {
            manager.start_all_streaming();
        }
    }

    log::info!("SparshaIO running. Press Ctrl-C to stop.");

    let mut last_status = Instant::now();
    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
        if last_status.elapsed() >= STATUS_INTERVAL {
            log_status(&manager, publisher.as_ref());
            last_status = Instant::now();
        }
    }

    log::info!("Shutting down...");
    log_status(&manager, publisher.as_ref());
    manager.shutdown();
    drop(publisher);

    log::info!("SparshaIO stopped");
    Ok(())
}
