//! The per-device driver contract and the connection session shared by all vendors.

use async_trait::async_trait;
use bluest::Uuid;
use futures_util::{FutureExt, StreamExt};
use tokio::time::{timeout, Duration};

use crate::error::{PollError, TransportError};
use crate::ogt::OgtBms;
use crate::reading::BmsReading;
use crate::registry::{Advertisement, BmsKind};
use crate::supervolt::SupervoltBms;
use crate::transport::{Notifications, Transport};

/// Tunables of one driver instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// How long to wait for the answer to one command
    pub response_timeout: Duration,
    /// Age after which a cached reading is no longer reported
    pub max_age: Duration,
    /// Extra connect attempts after the first one fails
    pub connect_retries: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(10),
            max_age: Duration::from_secs(120),
            connect_retries: 2,
        }
    }
}

/// Where a session is in its connect / exchange / disconnect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    Connected,
    AwaitingResponse,
    Disconnected,
}

/// One device's link: the transport, its single notification subscription and the state machine.
pub struct Session<T> {
    name: String,
    transport: T,
    notify_uuid: Uuid,
    notifications: Option<Notifications>,
    state: LinkState,
    connect_retries: u32,
}

impl<T: Transport> Session<T> {
    pub fn new(name: impl Into<String>, transport: T, notify_uuid: Uuid, connect_retries: u32) -> Self {
        Self {
            name: name.into(),
            transport,
            notify_uuid,
            notifications: None,
            state: LinkState::Idle,
            connect_retries,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    fn set_state(&mut self, state: LinkState) {
        if self.state != state {
            tracing::trace!(device = %self.name, from = ?self.state, to = ?state, "link state");
            self.state = state;
        }
    }

    /// Connect and enable notifications, unless that is already the case.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.notifications.is_some() && self.transport.is_connected().await {
            tracing::debug!(device = %self.name, "already connected");
            return Ok(());
        }

        self.set_state(LinkState::Connecting);
        if let Err(err) = self.try_connect().await {
            self.set_state(LinkState::Disconnected);
            return Err(err);
        }
        match self.transport.subscribe(self.notify_uuid).await {
            Ok(notifications) => {
                self.notifications = Some(notifications);
                self.set_state(LinkState::Connected);
                tracing::debug!(device = %self.name, "connected");
                Ok(())
            }
            Err(err) => {
                self.set_state(LinkState::Disconnected);
                Err(err)
            }
        }
    }

    async fn try_connect(&mut self) -> Result<(), TransportError> {
        let mut retries = self.connect_retries;
        loop {
            match self.transport.connect().await {
                Ok(()) => return Ok(()),
                Err(err) if retries > 0 => {
                    tracing::debug!(device = %self.name, %err, "failed to connect, retrying");
                    retries -= 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Write `command` and wait up to `wait` for the notification it triggers.
    ///
    /// Every notification is handed to `on_frame`, including ones that arrived
    /// before the command was written. Those are not taken as its response.
    /// Returns whether a response arrived in time.
    pub async fn request<F>(
        &mut self,
        characteristic: Uuid,
        command: &[u8],
        wait: Duration,
        mut on_frame: F,
    ) -> Result<bool, TransportError>
    where
        F: FnMut(&[u8]),
    {
        let notifications = self.notifications.as_mut().ok_or(TransportError::NotConnected)?;
        while let Some(Some(stale)) = notifications.next().now_or_never() {
            tracing::debug!(device = %self.name, rx = %hex::encode(&stale), "late notification");
            on_frame(&stale);
        }

        tracing::debug!(device = %self.name, tx = %hex::encode(command), "command");
        self.transport.write(characteristic, command).await?;
        self.set_state(LinkState::AwaitingResponse);

        let notifications = self.notifications.as_mut().ok_or(TransportError::NotConnected)?;
        let answered = match timeout(wait, notifications.next()).await {
            Ok(Some(frame)) => {
                tracing::debug!(device = %self.name, rx = %hex::encode(&frame), "notification");
                on_frame(&frame);
                true
            }
            Ok(None) => {
                self.notifications = None;
                self.set_state(LinkState::Disconnected);
                return Err(TransportError::NotificationsClosed);
            }
            Err(_) => {
                tracing::warn!(device = %self.name, "no response within {wait:?}");
                false
            }
        };
        self.set_state(LinkState::Connected);
        Ok(answered)
    }

    /// Drop the subscription and disconnect. Failures are logged, not returned.
    pub async fn disconnect(&mut self) {
        self.notifications = None;
        if self.transport.is_connected().await {
            tracing::debug!(device = %self.name, "disconnecting");
            if let Err(err) = self.transport.unsubscribe(self.notify_uuid).await {
                tracing::debug!(device = %self.name, %err, "failed to stop notifications");
            }
            if let Err(err) = self.transport.disconnect().await {
                tracing::warn!(device = %self.name, %err, "disconnect failed");
            }
        }
        self.set_state(LinkState::Disconnected);
    }

    /// Disconnect at the end of an exchange and return to idle.
    pub async fn finish(&mut self) {
        self.disconnect().await;
        self.set_state(LinkState::Idle);
    }
}

/// What every vendor driver offers its caller.
#[async_trait]
pub trait Bms: Send {
    fn kind(&self) -> BmsKind;

    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Run one exchange and return a fresh reading.
    ///
    /// Transport failures are logged and end the exchange early; only the
    /// absence of usable data is reported as an error.
    async fn poll(&mut self) -> Result<BmsReading, PollError>;

    async fn disconnect(&mut self);
}

/// A driver of any supported vendor.
pub enum BmsDriver<T> {
    Supervolt(SupervoltBms<T>),
    Offgridtec(OgtBms<T>),
}

impl<T: Transport> BmsDriver<T> {
    /// Build the driver `kind` for the advertised device.
    pub fn new(kind: BmsKind, advertisement: &Advertisement, transport: T, config: DriverConfig) -> Result<Self, PollError> {
        let name = advertisement
            .name
            .clone()
            .unwrap_or_else(|| advertisement.address.clone());
        Ok(match kind {
            BmsKind::Supervolt => Self::Supervolt(SupervoltBms::new(name, transport, config)),
            BmsKind::Offgridtec => Self::Offgridtec(OgtBms::new(&name, transport, config)?),
        })
    }

    pub fn state(&self) -> LinkState {
        match self {
            Self::Supervolt(bms) => bms.state(),
            Self::Offgridtec(bms) => bms.state(),
        }
    }
}

#[async_trait]
impl<T: Transport> Bms for BmsDriver<T> {
    fn kind(&self) -> BmsKind {
        match self {
            Self::Supervolt(bms) => bms.kind(),
            Self::Offgridtec(bms) => bms.kind(),
        }
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        match self {
            Self::Supervolt(bms) => bms.connect().await,
            Self::Offgridtec(bms) => bms.connect().await,
        }
    }

    async fn poll(&mut self) -> Result<BmsReading, PollError> {
        match self {
            Self::Supervolt(bms) => bms.poll().await,
            Self::Offgridtec(bms) => bms.poll().await,
        }
    }

    async fn disconnect(&mut self) {
        match self {
            Self::Supervolt(bms) => bms.disconnect().await,
            Self::Offgridtec(bms) => bms.disconnect().await,
        }
    }
}
