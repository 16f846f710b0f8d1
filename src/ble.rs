//! BLE session management: scan, connect, stream heart-rate measurements.
//!
//! Owns device discovery and the GATT session lifecycle. Decoded readings
//! and connection events are forwarded to the consumer loop over the signal
//! channel; the consumer resets the zone monitor when it sees
//! [`HrSignal::DeviceDisconnected`].

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use btleplug::api::{Central, CharPropFlags, Manager as _, Peripheral, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral as PlatformPeripheral};
use futures::StreamExt;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::measurement;
use crate::signal::HrSignal;

const HEART_RATE_MEASUREMENT_UUID: Uuid = Uuid::from_u128(0x00002a3700001000800000805f9b34fb);

const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const MAX_RECONNECT_DELAY_MS: u64 = 30_000;

enum SessionEnd {
    Shutdown,
    Disconnected,
}

pub struct BleManager {
    tx: Sender<HrSignal>,
    /// Substring matched against advertised peripheral names.
    device_name: String,
    auto_reconnect: bool,
    shutdown: CancellationToken,
}

impl BleManager {
    pub fn new(
        tx: Sender<HrSignal>,
        device_name: String,
        auto_reconnect: bool,
        shutdown: CancellationToken,
    ) -> Self {
        BleManager {
            tx,
            device_name,
            auto_reconnect,
            shutdown,
        }
    }

    /// Drive scan/connect/stream sessions until shutdown, a permanent
    /// disconnect (auto-reconnect off), or the reconnect attempts run out.
    pub async fn run(&self) -> Result<()> {
        let manager = Manager::new().await?;
        let adapter_list = manager.adapters().await?;
        let Some(adapter) = adapter_list.into_iter().next() else {
            bail!("no Bluetooth adapter found");
        };
        let adapter_info = adapter
            .adapter_info()
            .await
            .unwrap_or_else(|_| "unknown adapter".to_string());
        info!(adapter = %adapter_info, "using adapter");

        let mut reconnect_attempts = 0u32;
        loop {
            let Some(peripheral) = self.find_peripheral(&adapter).await? else {
                // Shutdown requested while scanning.
                return Ok(());
            };

            match self.stream_session(&peripheral).await {
                Ok(SessionEnd::Shutdown) => return Ok(()),
                Ok(SessionEnd::Disconnected) => {
                    // The session streamed; start the backoff ladder over.
                    reconnect_attempts = 0;
                }
                Err(err) => warn!(error = %err, "session failed"),
            }

            let _ = self.tx.send(HrSignal::DeviceDisconnected).await;

            if !self.auto_reconnect {
                return Ok(());
            }
            reconnect_attempts += 1;
            if reconnect_attempts > MAX_RECONNECT_ATTEMPTS {
                warn!("giving up after {MAX_RECONNECT_ATTEMPTS} reconnect attempts");
                return Ok(());
            }
            let delay = Duration::from_millis(
                (1000u64 * (1 << reconnect_attempts)).min(MAX_RECONNECT_DELAY_MS),
            );
            info!(attempt = reconnect_attempts, ?delay, "reconnecting after backoff");
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Scan until a peripheral whose name contains the configured device
    /// name shows up. Returns `None` on shutdown.
    async fn find_peripheral(&self, adapter: &Adapter) -> Result<Option<PlatformPeripheral>> {
        adapter.start_scan(ScanFilter::default()).await?;
        let _ = self.tx.send(HrSignal::ScanStarted).await;

        loop {
            if self.shutdown.is_cancelled() {
                adapter.stop_scan().await.ok();
                return Ok(None);
            }

            // Discovered so far; may still contain devices that already went
            // away, so connecting can fail and land us back here.
            let peripherals = adapter.peripherals().await?;

            let mut names = vec![];
            let mut target = None;
            for peripheral in &peripherals {
                let Some(name) = peripheral_name(peripheral).await else {
                    continue;
                };
                if target.is_none() && name.contains(&self.device_name) {
                    target = Some(peripheral.clone());
                }
                names.push(name);
            }
            let _ = self.tx.send(HrSignal::DiscoveredPeripherals(names)).await;

            if let Some(target) = target {
                adapter.stop_scan().await.ok();
                return Ok(Some(target));
            }

            // Don't hammer the adapter; discovery results accumulate.
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Connect, subscribe to the Heart Rate Measurement characteristic and
    /// forward decoded readings until the stream ends or shutdown.
    async fn stream_session(&self, peripheral: &PlatformPeripheral) -> Result<SessionEnd> {
        let name = peripheral_name(peripheral)
            .await
            .unwrap_or_else(|| String::from("(peripheral name unknown)"));

        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        info!(device = %name, "connected, discovering services");
        let _ = self.tx.send(HrSignal::ActiveDevice(name.clone())).await;

        peripheral.discover_services().await?;
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| {
                c.uuid == HEART_RATE_MEASUREMENT_UUID
                    && c.properties.contains(CharPropFlags::NOTIFY)
            })
            .ok_or_else(|| anyhow!("{name} has no notifying Heart Rate Measurement characteristic"))?;

        peripheral.subscribe(&characteristic).await?;
        info!(device = %name, uuid = %characteristic.uuid, "subscribed");

        let mut notifications = peripheral.notifications().await?;
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    peripheral.disconnect().await.ok();
                    return Ok(SessionEnd::Shutdown);
                }
                next = notifications.next() => {
                    let Some(data) = next else {
                        warn!(device = %name, "notification stream ended");
                        return Ok(SessionEnd::Disconnected);
                    };
                    if data.uuid != HEART_RATE_MEASUREMENT_UUID {
                        continue;
                    }
                    match measurement::decode(&data.value) {
                        Ok(reading) => {
                            let _ = self.tx.send(HrSignal::HeartRate(reading)).await;
                        }
                        // A short payload from a misbehaving device is not
                        // worth tearing the session down for.
                        Err(err) => warn!(device = %name, error = %err, "dropping undecodable measurement"),
                    }
                }
            }
        }
    }
}

async fn peripheral_name(peripheral: &PlatformPeripheral) -> Option<String> {
    let Ok(Some(properties)) = peripheral.properties().await else {
        return None;
    };
    properties.local_name
}
