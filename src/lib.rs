//! Live heart-rate zone training.
//!
//! Reads heart-rate measurements from a BLE sensor, classifies each reading
//! against a configured target zone with hysteresis, and fires debounced,
//! cooldown-limited alerts when the rate leaves the zone.

pub mod alert;
pub mod ble;
pub mod config;
pub mod fake;
pub mod measurement;
pub mod signal;
pub mod zone;
