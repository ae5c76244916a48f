use std::collections::HashMap;

use futures_util::future::join_all;
use tokio::time::Duration;

use crate::driver::{Bms, BmsDriver, LinkState};
use crate::error::PollError;
use crate::reading::BmsReading;
use crate::registry::{Advertisement, BmsKind, Registry};
use crate::transport::Transport;

struct Monitored<T> {
    driver: BmsDriver<T>,
    rssi: Option<i16>,
}

/// Keeps one driver per discovered battery and polls them.
///
/// Drivers are keyed by device address and live as long as the monitor, so a
/// device that is seen again keeps its driver and whatever it has cached.
pub struct Monitor<T> {
    registry: Registry,
    response_timeout: Option<Duration>,
    devices: HashMap<String, Monitored<T>>,
}

impl<T: Transport> Monitor<T> {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            response_timeout: None,
            devices: HashMap::new(),
        }
    }

    /// Use `response_timeout` for every vendor instead of its own default.
    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = Some(response_timeout);
        self
    }

    /// Handle one advertisement.
    ///
    /// `make` is only called for a supported device that is not known yet, to
    /// build the transport its driver will use. Returns the vendor if the
    /// device is monitored.
    pub fn observe(&mut self, advertisement: &Advertisement, make: impl FnOnce(BmsKind) -> T) -> Option<BmsKind> {
        if let Some(known) = self.devices.get_mut(&advertisement.address) {
            known.rssi = advertisement.rssi;
            return Some(known.driver.kind());
        }

        let kind = self.registry.identify(advertisement)?;
        let mut config = kind.default_config();
        if let Some(response_timeout) = self.response_timeout {
            config.response_timeout = response_timeout;
        }
        let driver = match BmsDriver::new(kind, advertisement, make(kind), config) {
            Ok(driver) => driver,
            Err(err) => {
                tracing::warn!(address = %advertisement.address, %err, "cannot monitor device");
                return None;
            }
        };
        tracing::info!(
            address = %advertisement.address,
            name = advertisement.name.as_deref().unwrap_or(""),
            "found {kind}"
        );
        self.devices.insert(
            advertisement.address.clone(),
            Monitored {
                driver,
                rssi: advertisement.rssi,
            },
        );
        Some(kind)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    /// Where the device's link is, if the device is monitored.
    pub fn link_state(&self, address: &str) -> Option<LinkState> {
        self.devices.get(address).map(|device| device.driver.state())
    }

    pub async fn poll(&mut self, address: &str) -> Result<BmsReading, PollError> {
        let device = self
            .devices
            .get_mut(address)
            .ok_or_else(|| PollError::UnknownDevice(address.to_string()))?;
        poll_device(device).await
    }

    /// Poll every device at once. Results are in no particular order.
    pub async fn poll_all(&mut self) -> Vec<(String, Result<BmsReading, PollError>)> {
        let polls = self.devices.iter_mut().map(|(address, device)| async move {
            let result = poll_device(device).await;
            (address.clone(), result)
        });
        join_all(polls).await
    }

    /// Disconnect from every device.
    pub async fn stop(&mut self) {
        join_all(self.devices.values_mut().map(|device| device.driver.disconnect())).await;
    }
}

async fn poll_device<T: Transport>(device: &mut Monitored<T>) -> Result<BmsReading, PollError> {
    let mut reading = device.driver.poll().await?;
    reading.rssi = device.rssi;
    Ok(reading)
}
