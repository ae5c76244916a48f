use std::collections::HashMap;

use anyhow::anyhow;
use async_trait::async_trait;
use bluest::{Adapter, AdvertisingDevice, Characteristic, Device, Uuid};
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

use super::{channel_notifications, Notifications, Transport};
use crate::error::TransportError;
use crate::registry::Advertisement;

/// [`Transport`] over a `bluest` adapter.
///
/// Characteristics are discovered on every connect, across all services, since
/// some vendors put their UART characteristics outside the service they advertise.
pub struct BluestTransport {
    adapter: Adapter,
    device: Device,
    characteristics: HashMap<Uuid, Characteristic>,
    listeners: HashMap<Uuid, JoinHandle<()>>,
}

impl BluestTransport {
    pub fn new(adapter: Adapter, device: Device) -> Self {
        Self {
            adapter,
            device,
            characteristics: HashMap::new(),
            listeners: HashMap::new(),
        }
    }

    /// The default adapter, once it is powered on.
    pub async fn default_adapter() -> anyhow::Result<Adapter> {
        let adapter = Adapter::default()
            .await
            .ok_or(anyhow!("Default adapter not found"))?;
        adapter.wait_available().await?;
        Ok(adapter)
    }

    /// Collect advertisements for `duration`, handing each one to `on_advertisement`.
    pub async fn scan<F>(adapter: &Adapter, duration: Duration, mut on_advertisement: F) -> anyhow::Result<()>
    where
        F: FnMut(Advertisement, Device),
    {
        let mut events = adapter.scan(&[]).await?;
        let collect = async {
            while let Some(found) = events.next().await {
                let advertisement = advertisement(&found);
                on_advertisement(advertisement, found.device);
            }
        };
        // The scan stream never ends by itself; the window closing is the normal exit.
        let _ = timeout(duration, collect).await;
        Ok(())
    }

    fn characteristic(&self, uuid: Uuid) -> Result<&Characteristic, TransportError> {
        self.characteristics
            .get(&uuid)
            .ok_or(TransportError::CharacteristicNotFound(uuid))
    }
}

fn advertisement(found: &AdvertisingDevice) -> Advertisement {
    Advertisement {
        name: found.adv_data.local_name.clone(),
        address: format!("{:?}", found.device.id()),
        service_uuids: found.adv_data.services.clone(),
        connectable: found.adv_data.is_connectable,
        rssi: found.rssi,
    }
}

#[async_trait]
impl Transport for BluestTransport {
    async fn is_connected(&self) -> bool {
        self.device.is_connected().await
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        self.adapter
            .connect_device(&self.device)
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;

        self.characteristics.clear();
        for service in self.device.discover_services().await? {
            for characteristic in service.discover_characteristics().await? {
                self.characteristics.insert(characteristic.uuid(), characteristic);
            }
        }
        Ok(())
    }

    async fn subscribe(&mut self, uuid: Uuid) -> Result<Notifications, TransportError> {
        let characteristic = self.characteristic(uuid)?.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        // The notify stream borrows its characteristic, so both live in the task.
        let listener = tokio::spawn(async move {
            let mut reader = match characteristic.notify().await {
                Ok(reader) => {
                    let _ = ready_tx.send(Ok(()));
                    reader
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            while let Some(item) = reader.next().await {
                match item {
                    Ok(data) => {
                        if tx.send(data).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%uuid, %err, "notification error");
                        break;
                    }
                }
            }
        });

        let subscribed = ready_rx.await.map_err(|_| TransportError::Subscribe {
            uuid,
            reason: "listener stopped".to_string(),
        })?;
        subscribed.map_err(|err| TransportError::Subscribe {
            uuid,
            reason: err.to_string(),
        })?;

        if let Some(previous) = self.listeners.insert(uuid, listener) {
            previous.abort();
        }
        Ok(channel_notifications(rx))
    }

    async fn unsubscribe(&mut self, uuid: Uuid) -> Result<(), TransportError> {
        if let Some(listener) = self.listeners.remove(&uuid) {
            listener.abort();
        }
        Ok(())
    }

    async fn write(&mut self, uuid: Uuid, data: &[u8]) -> Result<(), TransportError> {
        self.characteristic(uuid)?
            .write(data)
            .await
            .map_err(|err| TransportError::Write {
                uuid,
                reason: err.to_string(),
            })
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        for (_, listener) in self.listeners.drain() {
            listener.abort();
        }
        self.adapter
            .disconnect_device(&self.device)
            .await
            .map_err(|err| TransportError::Disconnect(err.to_string()))
    }
}
