use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hrzone::alert::{AlertDispatcher, LogHaptics, LogNotifications};
use hrzone::ble::BleManager;
use hrzone::config::AppConfig;
use hrzone::fake;
use hrzone::signal::HrSignal;
use hrzone::zone::ZoneMonitor;

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,hrzone=debug"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = AppConfig::from_env()?;
    info!(settings = ?config.monitor, "starting hrzone");

    let (tx, mut rx) = mpsc::channel(128);
    let shutdown = CancellationToken::new();

    if config.fake_source {
        let (min_bpm, max_bpm) = config.fake_bpm_range;
        info!(min_bpm, max_bpm, "using synthetic reading source");
        tokio::spawn(fake::transmit_fake_readings(tx.clone(), min_bpm, max_bpm));
    } else {
        let manager = BleManager::new(
            tx.clone(),
            config.device_name.clone(),
            config.monitor.auto_reconnect,
            shutdown.clone(),
        );
        tokio::spawn(async move {
            if let Err(err) = manager.run().await {
                error!(error = %err, "BLE manager exited");
            }
        });
    }

    let alerts = AlertDispatcher::new(Arc::new(LogHaptics), Arc::new(LogNotifications));
    let mut monitor = ZoneMonitor::new(config.monitor, alerts)?;
    monitor.set_on_status_change(|status| {
        info!(bpm = status.bpm, status = ?status.status, "heart rate");
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                shutdown.cancel();
                return Ok(());
            }
            signal = rx.recv() => {
                let Some(signal) = signal else { return Ok(()); };
                match signal {
                    HrSignal::HeartRate(reading) => {
                        monitor.process_heart_rate(&reading);
                    }
                    HrSignal::DiscoveredPeripherals(names) => {
                        info!(devices = ?names, "discovered peripherals");
                    }
                    HrSignal::ScanStarted => info!("scan started"),
                    HrSignal::ActiveDevice(name) => info!(device = %name, "receiving measurements"),
                    HrSignal::DeviceDisconnected => {
                        info!("device disconnected");
                        monitor.reset();
                    }
                }
            }
        }
    }
}
