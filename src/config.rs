//! Environment-based startup configuration.
//!
//! Supplies the initial monitoring [`Settings`] plus app-level knobs (which
//! device to connect to, whether to run the synthetic source). Runtime
//! settings changes go through `ZoneMonitor::update_settings`; nothing here
//! is persisted.

use std::env;
use std::str::FromStr;

use thiserror::Error;

use crate::alert::VibrationPattern;
use crate::zone::{Settings, SettingsError, TargetZone};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value in environment variable {0}")]
    ParseError(&'static str),
    #[error(transparent)]
    InvalidSettings(#[from] SettingsError),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Peripheral name to connect to (substring match). Empty matches the
    /// first named peripheral that shows up.
    pub device_name: String,
    /// Run the synthetic reading source instead of BLE.
    pub fake_source: bool,
    /// BPM band for the synthetic source.
    pub fake_bpm_range: (u16, u16),
    /// Initial monitoring settings.
    pub monitor: Settings,
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Settings::default();
        let monitor = Settings {
            target_zone: TargetZone {
                min_bpm: parse_env("HRZONE_ZONE_MIN", defaults.target_zone.min_bpm)?,
                max_bpm: parse_env("HRZONE_ZONE_MAX", defaults.target_zone.max_bpm)?,
            },
            hysteresis_range: parse_env("HRZONE_HYSTERESIS", defaults.hysteresis_range)?,
            cooldown_seconds: parse_env("HRZONE_COOLDOWN_SECONDS", defaults.cooldown_seconds)?,
            vibration_enabled: parse_env("HRZONE_VIBRATION", defaults.vibration_enabled)?,
            vibration_pattern: parse_pattern("HRZONE_PATTERN", defaults.vibration_pattern)?,
            auto_reconnect: parse_env("HRZONE_AUTO_RECONNECT", defaults.auto_reconnect)?,
        };
        monitor.validate()?;

        Ok(Self {
            device_name: env::var("HRZONE_DEVICE").unwrap_or_default(),
            fake_source: parse_env("HRZONE_FAKE_SOURCE", false)?,
            fake_bpm_range: (
                parse_env("HRZONE_FAKE_MIN", 120)?,
                parse_env("HRZONE_FAKE_MAX", 175)?,
            ),
            monitor,
        })
    }
}

fn parse_env<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::ParseError(key)),
        Err(_) => Ok(default),
    }
}

fn parse_pattern(
    key: &'static str,
    default: VibrationPattern,
) -> Result<VibrationPattern, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.as_str() {
            "short" => Ok(VibrationPattern::Short),
            "double" => Ok(VibrationPattern::Double),
            "long" => Ok(VibrationPattern::Long),
            _ => Err(ConfigError::ParseError(key)),
        },
        Err(_) => Ok(default),
    }
}
