//! Alert delivery: haptic patterns and local notifications.
//!
//! The monitor only decides *that* an alert fires and *what* it says; actual
//! vibration and OS notification rendering sit behind [`HapticSink`] and
//! [`NotificationSink`]. Both are best-effort: a failing sink is logged and
//! never propagates back into heart-rate processing.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::measurement::unix_millis;
use crate::zone::{Settings, Zone, ZoneStatus};

/// A sink reported that it could not deliver.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct DeliveryFailure(pub String);

/// Named impact intensity understood by the haptic engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactStyle {
    Light,
    Medium,
    Heavy,
}

/// Pulse sequence fired on a zone alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VibrationPattern {
    /// One medium pulse.
    Short,
    /// Two medium pulses 150 ms apart.
    Double,
    /// Three heavy pulses at 0/200/400 ms.
    Long,
}

pub trait HapticSink: Send + Sync {
    fn impact(&self, style: ImpactStyle) -> Result<(), DeliveryFailure>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Unix millis at which the notification should be shown.
    pub scheduled_at: u64,
}

pub trait NotificationSink: Send + Sync {
    fn schedule(&self, notification: Notification) -> Result<(), DeliveryFailure>;
}

/// Fans one zone alert out to the haptic and notification sinks.
pub struct AlertDispatcher {
    haptics: Arc<dyn HapticSink>,
    notifications: Arc<dyn NotificationSink>,
}

impl AlertDispatcher {
    pub fn new(haptics: Arc<dyn HapticSink>, notifications: Arc<dyn NotificationSink>) -> Self {
        Self {
            haptics,
            notifications,
        }
    }

    /// Fire the configured alert for an out-of-zone status.
    ///
    /// With vibration disabled nothing happens at all, notification
    /// included. Sink failures are logged and dropped.
    pub fn dispatch(&self, status: ZoneStatus, settings: &Settings) {
        if !settings.vibration_enabled {
            return;
        }
        self.vibrate(settings.vibration_pattern);
        self.notify(status);
    }

    fn vibrate(&self, pattern: VibrationPattern) {
        match pattern {
            VibrationPattern::Short => self.pulse(ImpactStyle::Medium),
            VibrationPattern::Double => {
                self.pulse(ImpactStyle::Medium);
                self.pulse_after(150, ImpactStyle::Medium);
            }
            VibrationPattern::Long => {
                self.pulse(ImpactStyle::Heavy);
                self.pulse_after(200, ImpactStyle::Heavy);
                self.pulse_after(400, ImpactStyle::Heavy);
            }
        }
    }

    fn pulse(&self, style: ImpactStyle) {
        if let Err(err) = self.haptics.impact(style) {
            warn!(error = %err, "haptic pulse failed");
        }
    }

    /// Delayed pulses are fire-and-forget; nothing waits on them and each
    /// failure is contained in its own task.
    fn pulse_after(&self, delay_ms: u64, style: ImpactStyle) {
        let haptics = Arc::clone(&self.haptics);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if let Err(err) = haptics.impact(style) {
                warn!(error = %err, "haptic pulse failed");
            }
        });
    }

    fn notify(&self, status: ZoneStatus) {
        let direction = if status.status == Zone::Above {
            "high"
        } else {
            "low"
        };
        let notification = Notification {
            title: "Heart Rate Alert".to_string(),
            body: format!(
                "Heart rate too {}: {} BPM (Target: {}-{})",
                direction, status.bpm, status.zone.min_bpm, status.zone.max_bpm
            ),
            scheduled_at: unix_millis() + 100,
        };
        if let Err(err) = self.notifications.schedule(notification) {
            warn!(error = %err, "notification scheduling failed");
        }
    }
}

/// Haptic sink that only logs. Platform bridges live outside this crate.
pub struct LogHaptics;

impl HapticSink for LogHaptics {
    fn impact(&self, style: ImpactStyle) -> Result<(), DeliveryFailure> {
        info!(?style, "haptic impact");
        Ok(())
    }
}

/// Notification sink that only logs.
pub struct LogNotifications;

impl NotificationSink for LogNotifications {
    fn schedule(&self, notification: Notification) -> Result<(), DeliveryFailure> {
        info!(title = %notification.title, body = %notification.body, "notification scheduled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::zone::TargetZone;

    struct Recorder {
        impacts: Mutex<Vec<ImpactStyle>>,
        notes: Mutex<Vec<Notification>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                impacts: Mutex::new(vec![]),
                notes: Mutex::new(vec![]),
            })
        }
    }

    impl HapticSink for Recorder {
        fn impact(&self, style: ImpactStyle) -> Result<(), DeliveryFailure> {
            self.impacts.lock().unwrap().push(style);
            Ok(())
        }
    }

    impl NotificationSink for Recorder {
        fn schedule(&self, notification: Notification) -> Result<(), DeliveryFailure> {
            self.notes.lock().unwrap().push(notification);
            Ok(())
        }
    }

    fn status(zone: Zone, bpm: u16) -> ZoneStatus {
        ZoneStatus {
            status: zone,
            bpm,
            zone: TargetZone {
                min_bpm: 140,
                max_bpm: 160,
            },
        }
    }

    #[test]
    fn disabled_vibration_suppresses_everything() {
        let recorder = Recorder::new();
        let dispatcher = AlertDispatcher::new(recorder.clone(), recorder.clone());
        let settings = Settings {
            vibration_enabled: false,
            ..Settings::default()
        };

        dispatcher.dispatch(status(Zone::Above, 180), &settings);

        assert!(recorder.impacts.lock().unwrap().is_empty());
        assert!(recorder.notes.lock().unwrap().is_empty());
    }

    #[test]
    fn notification_body_tells_high_from_low() {
        let recorder = Recorder::new();
        let dispatcher = AlertDispatcher::new(recorder.clone(), recorder.clone());
        let settings = Settings {
            vibration_pattern: VibrationPattern::Short,
            ..Settings::default()
        };

        dispatcher.dispatch(status(Zone::Above, 180), &settings);
        dispatcher.dispatch(status(Zone::Below, 100), &settings);

        let notes = recorder.notes.lock().unwrap();
        assert_eq!(notes[0].title, "Heart Rate Alert");
        assert_eq!(notes[0].body, "Heart rate too high: 180 BPM (Target: 140-160)");
        assert_eq!(notes[1].body, "Heart rate too low: 100 BPM (Target: 140-160)");
    }

    #[test]
    fn short_pattern_is_one_medium_pulse() {
        let recorder = Recorder::new();
        let dispatcher = AlertDispatcher::new(recorder.clone(), recorder.clone());
        let settings = Settings {
            vibration_pattern: VibrationPattern::Short,
            ..Settings::default()
        };

        dispatcher.dispatch(status(Zone::Below, 90), &settings);

        assert_eq!(*recorder.impacts.lock().unwrap(), vec![ImpactStyle::Medium]);
    }

    #[tokio::test]
    async fn double_pattern_delivers_second_pulse_later() {
        let recorder = Recorder::new();
        let dispatcher = AlertDispatcher::new(recorder.clone(), recorder.clone());
        let settings = Settings {
            vibration_pattern: VibrationPattern::Double,
            ..Settings::default()
        };

        dispatcher.dispatch(status(Zone::Above, 180), &settings);
        assert_eq!(recorder.impacts.lock().unwrap().len(), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(
            *recorder.impacts.lock().unwrap(),
            vec![ImpactStyle::Medium, ImpactStyle::Medium]
        );
    }

    #[tokio::test]
    async fn long_pattern_is_three_heavy_pulses() {
        let recorder = Recorder::new();
        let dispatcher = AlertDispatcher::new(recorder.clone(), recorder.clone());
        let settings = Settings {
            vibration_pattern: VibrationPattern::Long,
            ..Settings::default()
        };

        dispatcher.dispatch(status(Zone::Below, 100), &settings);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(
            *recorder.impacts.lock().unwrap(),
            vec![ImpactStyle::Heavy, ImpactStyle::Heavy, ImpactStyle::Heavy]
        );
    }

    #[test]
    fn failing_sinks_do_not_panic_or_propagate() {
        struct Failing;
        impl HapticSink for Failing {
            fn impact(&self, _style: ImpactStyle) -> Result<(), DeliveryFailure> {
                Err(DeliveryFailure("no haptic engine".into()))
            }
        }
        impl NotificationSink for Failing {
            fn schedule(&self, _notification: Notification) -> Result<(), DeliveryFailure> {
                Err(DeliveryFailure("notifications denied".into()))
            }
        }

        let dispatcher = AlertDispatcher::new(Arc::new(Failing), Arc::new(Failing));
        let settings = Settings {
            vibration_pattern: VibrationPattern::Short,
            ..Settings::default()
        };
        dispatcher.dispatch(status(Zone::Above, 200), &settings);
    }
}
