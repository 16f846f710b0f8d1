use crate::measurement::Reading;

/// Events flowing from the reading source task to the consumer loop.
#[derive(Debug, Clone)]
pub enum HrSignal {
    HeartRate(Reading),
    DiscoveredPeripherals(Vec<String>),
    ScanStarted,
    ActiveDevice(String),
    DeviceDisconnected,
}
