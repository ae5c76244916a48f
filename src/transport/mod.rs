//! The radio link as the drivers see it.
//!
//! A driver never talks to a BLE stack directly. It holds something that
//! implements [`Transport`], which is either the `bluest` adapter in
//! [`BluestTransport`] or, in tests, a scripted mock.

use async_trait::async_trait;
use bluest::Uuid;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::TransportError;

mod ble;
#[cfg(test)]
pub(crate) mod mock;

pub use ble::BluestTransport;

/// Inbound notification payloads of one subscription, in arrival order.
pub type Notifications = BoxStream<'static, Vec<u8>>;

/// Connection to one physical device.
#[async_trait]
pub trait Transport: Send {
    async fn is_connected(&self) -> bool;

    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Enable notifications of `characteristic`. The stream ends when the
    /// subscription is dropped or the link goes down.
    async fn subscribe(&mut self, characteristic: Uuid) -> Result<Notifications, TransportError>;

    async fn unsubscribe(&mut self, characteristic: Uuid) -> Result<(), TransportError>;

    async fn write(&mut self, characteristic: Uuid, data: &[u8]) -> Result<(), TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

/// Expose the receiving half of a channel as a notification stream.
pub fn channel_notifications(receiver: UnboundedReceiver<Vec<u8>>) -> Notifications {
    stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await.map(|data| (data, receiver))
    })
    .boxed()
}

/// Expand a 16 bit Bluetooth SIG short UUID to its full form.
pub const fn short_uuid(short: u16) -> Uuid {
    Uuid::from_u128(0x0000_0000_0000_1000_8000_0080_5f9b_34fb | ((short as u128) << 96))
}
