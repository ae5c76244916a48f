//! Supervolt "Black" batteries (advertised as `libatt…`).
//!
//! The BMS speaks a line protocol over the Nordic UART characteristics. Two
//! fixed ASCII commands are sent per poll: the first asks for realtime data
//! (cell voltages, currents, temperatures, state of charge), the second for
//! capacities. Each is answered by a single notification carrying one frame,
//! see [`frame`] for the layout.

use bluest::Uuid;

use crate::driver::{DriverConfig, LinkState, Session};
use crate::error::{PollError, TransportError};
use crate::reading::BmsReading;
use crate::registry::BmsKind;
use crate::transport::{short_uuid, Transport};

pub mod frame;
mod store;
mod working_state;

pub use store::TelemetryStore;
pub use working_state::{Status, WorkingState};

pub struct SupervoltBms<T> {
    session: Session<T>,
    store: TelemetryStore,
    config: DriverConfig,
}

impl<T: Transport> SupervoltBms<T> {
    pub const SERVICE_ID: Uuid = short_uuid(0xff00);
    pub const NORDIC_UART_WRITE_CHARACTERISTIC_ID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);
    pub const NORDIC_UART_NOTIFY_CHARACTERISTIC_ID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);
    /// A verbatim message to send which requests the realtime frame
    pub const REQ_REALTIME: &'static [u8] = b":000250000E03~";
    /// A verbatim message to send which requests the capacity frame
    pub const REQ_CAPACITY: &'static [u8] = b":001031000E05~";

    pub fn new(name: impl Into<String>, transport: T, config: DriverConfig) -> Self {
        Self::with_store(name, transport, config, TelemetryStore::new(config.max_age))
    }

    /// Create a driver that continues from telemetry collected by an earlier one.
    pub fn with_store(name: impl Into<String>, transport: T, config: DriverConfig, store: TelemetryStore) -> Self {
        let session = Session::new(
            name,
            transport,
            Self::NORDIC_UART_NOTIFY_CHARACTERISTIC_ID,
            config.connect_retries,
        );
        Self { session, store, config }
    }

    pub fn kind(&self) -> BmsKind {
        BmsKind::Supervolt
    }

    pub fn state(&self) -> LinkState {
        self.session.state()
    }

    pub fn store(&self) -> &TelemetryStore {
        &self.store
    }

    pub fn into_store(self) -> TelemetryStore {
        self.store
    }

    pub async fn connect(&mut self) -> Result<(), TransportError> {
        self.session.connect().await
    }

    /// Read the current state from the battery.
    ///
    /// Always ends disconnected. If the device did not answer, this reports
    /// [`PollError::NoData`] rather than the values of an earlier poll.
    pub async fn poll(&mut self) -> Result<BmsReading, PollError> {
        if let Err(err) = self.exchange().await {
            tracing::warn!(device = %self.session.name(), %err, "exchange aborted");
        }
        self.session.finish().await;

        let mut reading = self.store.snapshot().ok_or(PollError::NoData)?;
        reading.calc_values();
        tracing::debug!(device = %self.session.name(), ?reading, "data collected");
        Ok(reading)
    }

    pub async fn disconnect(&mut self) {
        self.session.disconnect().await;
    }

    async fn exchange(&mut self) -> Result<(), TransportError> {
        self.session.connect().await?;
        self.store.reset();

        for command in [Self::REQ_REALTIME, Self::REQ_CAPACITY] {
            let store = &mut self.store;
            let answered = self
                .session
                .request(
                    Self::NORDIC_UART_WRITE_CHARACTERISTIC_ID,
                    command,
                    self.config.response_timeout,
                    |frame| store.apply_frame(frame),
                )
                .await?;
            if !answered {
                break;
            }
        }
        Ok(())
    }
}
