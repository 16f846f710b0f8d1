//! Target-zone classification and the alerting state machine.
//!
//! Classification widens the configured zone symmetrically by the
//! hysteresis range and does a single three-way threshold test per reading.
//! It is deliberately not a directional Schmitt trigger: the thresholds do
//! not depend on the previous status.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::alert::{AlertDispatcher, VibrationPattern};
use crate::measurement::Reading;

/// Upper bound for configurable BPM values.
pub const MAX_BPM: u16 = 300;

/// Out-of-zone status changes required before an alert may fire.
const ALERT_DEBOUNCE_COUNT: u32 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("target zone minimum {min} must be below maximum {max}")]
    ZoneBoundsReversed { min: u16, max: u16 },
    #[error("target zone bound {0} exceeds {MAX_BPM} BPM")]
    ZoneOutOfRange(u16),
    #[error("hysteresis range {0} exceeds {MAX_BPM} BPM")]
    HysteresisOutOfRange(u16),
    #[error("cooldown must be at least one second")]
    CooldownTooShort,
}

/// The BPM range the user wants to train in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetZone {
    pub min_bpm: u16,
    pub max_bpm: u16,
}

/// Monitoring configuration. Replaced wholesale on every change, never
/// partially mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub target_zone: TargetZone,
    /// BPM margin added symmetrically around the target zone before a
    /// status change registers.
    pub hysteresis_range: u16,
    /// Minimum seconds between two fired alerts.
    pub cooldown_seconds: u32,
    pub vibration_enabled: bool,
    pub vibration_pattern: VibrationPattern,
    /// Consumed by the connectivity layer, not the monitor.
    pub auto_reconnect: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_zone: TargetZone {
                min_bpm: 140,
                max_bpm: 160,
            },
            hysteresis_range: 3,
            cooldown_seconds: 10,
            vibration_enabled: true,
            vibration_pattern: VibrationPattern::Double,
            auto_reconnect: true,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        let TargetZone { min_bpm, max_bpm } = self.target_zone;
        if min_bpm >= max_bpm {
            return Err(SettingsError::ZoneBoundsReversed {
                min: min_bpm,
                max: max_bpm,
            });
        }
        if max_bpm > MAX_BPM {
            return Err(SettingsError::ZoneOutOfRange(max_bpm));
        }
        if self.hysteresis_range > MAX_BPM {
            return Err(SettingsError::HysteresisOutOfRange(self.hysteresis_range));
        }
        if self.cooldown_seconds == 0 {
            return Err(SettingsError::CooldownTooShort);
        }
        Ok(())
    }
}

/// Where a reading sits relative to the (hysteresis-widened) target zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Below,
    In,
    Above,
}

/// Classification result for one reading. Recomputed on every call; the
/// zone snapshot reflects the settings active at computation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneStatus {
    pub status: Zone,
    pub bpm: u16,
    pub zone: TargetZone,
}

type StatusCallback = Box<dyn FnMut(ZoneStatus) + Send>;

/// Tracks zone status across a stream of readings and decides when the
/// alert sinks fire.
///
/// Intended for one device session at a time; all state is owned here and
/// mutated only through [`ZoneMonitor::process_heart_rate`] and
/// [`ZoneMonitor::reset`]. Cooldown is a plain timestamp comparison against
/// `Reading::timestamp`, which is expected to be non-decreasing.
pub struct ZoneMonitor {
    settings: Settings,
    alerts: AlertDispatcher,
    current_status: Zone,
    consecutive_out_of_zone: u32,
    /// `None` until the first alert, and again after `reset()`, so a fresh
    /// monitor is never cooldown-blocked.
    last_alert_at: Option<u64>,
    on_status_change: Option<StatusCallback>,
}

impl ZoneMonitor {
    pub fn new(settings: Settings, alerts: AlertDispatcher) -> Result<Self, SettingsError> {
        settings.validate()?;
        Ok(Self {
            settings,
            alerts,
            current_status: Zone::In,
            consecutive_out_of_zone: 0,
            last_alert_at: None,
            on_status_change: None,
        })
    }

    /// Replace the active settings wholesale.
    ///
    /// The state machine carries over: status, debounce counter and the
    /// cooldown clock survive a settings change mid-session.
    pub fn update_settings(&mut self, settings: Settings) -> Result<(), SettingsError> {
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    /// Register the status observer, replacing any previous registration.
    /// Single slot, not a listener list.
    pub fn set_on_status_change<F>(&mut self, callback: F)
    where
        F: FnMut(ZoneStatus) + Send + 'static,
    {
        self.on_status_change = Some(Box::new(callback));
    }

    /// Latest status without recomputation.
    pub fn current_status(&self) -> Zone {
        self.current_status
    }

    /// Back to a fresh session: status `in`, counter zero, cooldown clear.
    /// Called by the connectivity layer on disconnect.
    pub fn reset(&mut self) {
        self.current_status = Zone::In;
        self.consecutive_out_of_zone = 0;
        self.last_alert_at = None;
    }

    /// Classify one reading, notify the observer, and fire an alert when
    /// the debounce and cooldown rules say so.
    pub fn process_heart_rate(&mut self, reading: &Reading) -> ZoneStatus {
        let status = self.classify(reading.bpm);
        let result = ZoneStatus {
            status,
            bpm: reading.bpm,
            zone: self.settings.target_zone,
        };

        if status != self.current_status {
            if status == Zone::In {
                self.consecutive_out_of_zone = 0;
            } else {
                // Every change onto an out-of-zone status counts, including
                // flipping straight from below to above.
                self.consecutive_out_of_zone += 1;
                if self.consecutive_out_of_zone >= ALERT_DEBOUNCE_COUNT
                    && self.cooldown_elapsed(reading.timestamp)
                {
                    self.alerts.dispatch(result, &self.settings);
                    self.last_alert_at = Some(reading.timestamp);
                }
            }
            debug!(from = ?self.current_status, to = ?status, bpm = reading.bpm, "zone status changed");
            self.current_status = status;
        }

        // Observer fires on every reading, changed or not.
        if let Some(callback) = self.on_status_change.as_mut() {
            callback(result);
        }
        result
    }

    fn classify(&self, bpm: u16) -> Zone {
        let zone = self.settings.target_zone;
        let lower = zone.min_bpm.saturating_sub(self.settings.hysteresis_range);
        let upper = zone.max_bpm + self.settings.hysteresis_range;
        if bpm < lower {
            Zone::Below
        } else if bpm > upper {
            Zone::Above
        } else {
            Zone::In
        }
    }

    fn cooldown_elapsed(&self, now: u64) -> bool {
        match self.last_alert_at {
            Some(at) => now.saturating_sub(at) >= self.settings.cooldown_seconds as u64 * 1000,
            None => true,
        }
    }
}
