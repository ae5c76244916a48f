//! Offgridtec LiFePO4 Smart Pro batteries, type A and type B (advertised as `SmartBat-A…` / `SmartBat-B…`).
//!
//! Values are read one register at a time; see [`codec`] for the message format.

use bluest::Uuid;

use crate::driver::{DriverConfig, LinkState, Session};
use crate::error::{PollError, TransportError};
use crate::reading::BmsReading;
use crate::registry::BmsKind;
use crate::transport::{short_uuid, Transport};

pub mod codec;

use codec::Variant;

pub struct OgtBms<T> {
    session: Session<T>,
    variant: Variant,
    key: u8,
    config: DriverConfig,
}

impl<T: Transport> OgtBms<T> {
    pub const SERVICE_ID: Uuid = short_uuid(0xfff0);
    pub const RX_CHARACTERISTIC_ID: Uuid = short_uuid(0xfff4);
    pub const TX_CHARACTERISTIC_ID: Uuid = short_uuid(0xfff6);

    /// Fails if `name` does not carry the model type and device id the key is derived from.
    pub fn new(name: &str, transport: T, config: DriverConfig) -> Result<Self, PollError> {
        let (variant, key) =
            codec::parse_name(name).ok_or_else(|| PollError::UnsupportedName(Some(name.to_string())))?;
        tracing::info!(device = %name, ?variant, "key: 0x{key:02X}");
        let session = Session::new(name, transport, Self::RX_CHARACTERISTIC_ID, config.connect_retries);
        Ok(Self {
            session,
            variant,
            key,
            config,
        })
    }

    pub fn kind(&self) -> BmsKind {
        BmsKind::Offgridtec
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn state(&self) -> LinkState {
        self.session.state()
    }

    pub async fn connect(&mut self) -> Result<(), TransportError> {
        self.session.connect().await
    }

    /// Query every register of the model and return what was answered.
    pub async fn poll(&mut self) -> Result<BmsReading, PollError> {
        let mut reading = BmsReading::default();
        if let Err(err) = self.exchange(&mut reading).await {
            tracing::warn!(device = %self.session.name(), %err, "exchange aborted");
        }
        self.session.finish().await;

        if reading.is_empty() {
            return Err(PollError::NoData);
        }
        reading.calc_values();
        tracing::debug!(device = %self.session.name(), ?reading, "data collected");
        Ok(reading)
    }

    pub async fn disconnect(&mut self) {
        self.session.disconnect().await;
    }

    async fn exchange(&mut self, reading: &mut BmsReading) -> Result<(), TransportError> {
        self.session.connect().await?;

        let (variant, key) = (self.variant, self.key);
        for register in variant.registers() {
            let command = codec::command(variant, register, key);
            let answered = self
                .session
                .request(Self::TX_CHARACTERISTIC_ID, &command, self.config.response_timeout, |frame| {
                    match codec::decode(variant, frame, key) {
                        Ok((field, value)) => field.apply(reading, value),
                        Err(err) => tracing::debug!(%err, "response ignored"),
                    }
                })
                .await?;
            if !answered {
                tracing::debug!(device = %self.session.name(), field = ?register.field, "reading timed out");
            }
        }
        Ok(())
    }
}
