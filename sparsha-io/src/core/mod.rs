//! Core abstractions for sensor drivers.
//!
//! - [`driver::SensorDriver`]: Trait implemented by every transport driver
//! - [`driver::DriverCore`]: Status, streaming flag and callback fan-out shared by drivers
//! - [`types`]: Configuration, readings, quality and status types
//! - [`quality`]: Per-reading and windowed quality assessment
//! - [`processing`]: Calibration applied before dispatch

pub mod driver;
pub mod processing;
pub mod quality;
pub mod types;
