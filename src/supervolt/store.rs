use tokio::time::{Duration, Instant};

use super::frame::{self, TelemetryRecord, EXPOSED_CELLS};
use super::working_state::WorkingState;
use crate::error::DecodeError;
use crate::reading::BmsReading;

/// The latest telemetry of one device and the rules for when it may be reported.
#[derive(Debug, Clone)]
pub struct TelemetryStore {
    record: TelemetryRecord,
    max_age: Duration,
}

impl TelemetryStore {
    pub fn new(max_age: Duration) -> Self {
        Self {
            record: TelemetryRecord::default(),
            max_age,
        }
    }

    pub fn record(&self) -> &TelemetryRecord {
        &self.record
    }

    /// Decode one notification into the record. Bad frames are logged and otherwise ignored.
    pub fn apply_frame(&mut self, raw: &[u8]) {
        match frame::decode(&mut self.record, raw) {
            Ok(kind) => tracing::debug!(?kind, "frame decoded"),
            Err(DecodeError::UnknownLength(len)) => tracing::warn!("wrong length: {len}"),
            Err(err) => tracing::error!(%err, "failed to decode frame"),
        }
    }

    /// Forget everything, so a failed exchange cannot report the previous one's values.
    pub fn reset(&mut self) {
        tracing::info!("reset");
        self.record = TelemetryRecord::default();
    }

    pub fn snapshot(&self) -> Option<BmsReading> {
        self.snapshot_at(Instant::now())
    }

    /// The reading as of `now`, or `None` if it is too old or the pack voltage is missing or zero.
    ///
    /// `delta_voltage` carries the pack voltage, not the cell spread. Consumers
    /// of this vendor have always seen it that way.
    pub fn snapshot_at(&self, now: Instant) -> Option<BmsReading> {
        let record = &self.record;
        let fresh = record
            .last_update
            .is_some_and(|updated| now.saturating_duration_since(updated) <= self.max_age);
        let voltage = match record.total_voltage {
            Some(voltage) if fresh && voltage != 0.0 => voltage,
            _ => {
                tracing::debug!("data too old");
                return None;
            }
        };

        Some(BmsReading {
            voltage: Some(voltage),
            delta_voltage: Some(voltage),
            current: record.pack_current,
            battery_level: record.state_of_charge.map(u16::from),
            cycle_charge: record.remaining_capacity,
            temperature: record.temperatures[0].map(f64::from),
            cycles: record.charge_cycles.map(u32::from),
            cell_count: Some(EXPOSED_CELLS),
            cells: record.cell_voltages[..EXPOSED_CELLS].to_vec(),
            ..Default::default()
        })
    }

    pub fn working_state(&self) -> Option<WorkingState> {
        self.record.working_state.map(WorkingState)
    }
}
