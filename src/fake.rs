use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc::Sender;

use crate::measurement::{unix_millis, Reading};
use crate::signal::HrSignal;

/// Emits synthetic readings so the rest of the app can run without a sensor.
pub async fn transmit_fake_readings(tx: Sender<HrSignal>, min_bpm: u16, max_bpm: u16) {
    loop {
        let bpm = rand::thread_rng().gen_range(min_bpm..=max_bpm);
        let reading = Reading {
            bpm,
            timestamp: unix_millis(),
            sensor_contact: None,
            energy_expended: None,
            rr_intervals: None,
        };
        if tx.send(HrSignal::HeartRate(reading)).await.is_err() {
            // Consumer is gone.
            return;
        }
        tokio::time::sleep(Duration::from_millis(800)).await;
    }
}
