//! Decoding of Supervolt telemetry frames.
//!
//! A frame is ASCII text: a `:` start byte followed by fixed width hex fields,
//! each a big-endian integer. Two frames carry data and are told apart by
//! their length alone.
//!
//! Realtime frame, 128 bytes:
//!
//! Offset | Width  | Field
//! 1      | 2      | address
//! 3      | 2      | command
//! 5      | 2      | version
//! 7      | 4      | payload length
//! 11     | 14     | timestamp (ignored)
//! 25     | 16 × 4 | cell voltages in mV, the first [`CELL_SLOTS`] are decoded
//! 89     | 4      | charging current in A/100
//! 93     | 4      | discharging current in A/100
//! 97     | 4 × 2  | temperatures in °C + 40
//! 105    | 4      | working state bits
//! 109    | 2      | alarm bits
//! 111    | 4      | balance state bits
//! 115    | 4      | discharge cycles
//! 119    | 4      | charge cycles
//! 123    | 2      | state of charge in %
//!
//! Capacity frame, 30 bytes: the same 10 byte header, 4 reserved, then
//! remaining, total and designed capacity in Ah/10, 4 each.

use tokio::time::Instant;

use crate::error::DecodeError;

pub const REALTIME_LEN: usize = 128;
pub const CAPACITY_LEN: usize = 30;
/// Cell voltage slots the frame has room for
const CELL_REGION_SLOTS: usize = 16;
/// Cell voltage slots that are decoded
pub const CELL_SLOTS: usize = 11;
/// Cell voltages published in a reading
pub const EXPOSED_CELLS: usize = 4;
pub const TEMPERATURE_SLOTS: usize = 4;
/// Larger currents are framing errors, not measurements
const MAX_PLAUSIBLE_CURRENT_A: f64 = 500.0;
const TIMESTAMP_WIDTH: usize = 14;
const RESERVED_WIDTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Realtime,
    Capacity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub address: u8,
    pub command: u8,
    pub version: u8,
    pub length: u16,
}

/// Everything the device has told us, field by field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryRecord {
    pub header: Option<FrameHeader>,
    /// Sum of the decoded cell voltages in V
    pub total_voltage: Option<f64>,
    pub cell_voltages: [Option<f64>; CELL_SLOTS],
    pub charging_current: Option<f64>,
    pub discharging_current: Option<f64>,
    /// Discharging minus charging current in A
    pub pack_current: Option<f64>,
    pub state_of_charge: Option<u8>,
    pub remaining_capacity: Option<f64>,
    pub total_capacity: Option<f64>,
    pub designed_capacity: Option<f64>,
    pub temperatures: [Option<i32>; TEMPERATURE_SLOTS],
    pub working_state: Option<u16>,
    pub alarm: Option<u8>,
    pub balance_state: Option<u16>,
    pub charge_cycles: Option<u16>,
    pub discharge_cycles: Option<u16>,
    /// When the last complete frame was decoded
    pub last_update: Option<Instant>,
}

/// Decode `raw` into `record`.
///
/// Fields are written as they are parsed, so a frame that turns out to be
/// malformed halfway leaves the fields before the bad one applied. Only a
/// complete frame moves `last_update`.
pub fn decode(record: &mut TelemetryRecord, raw: &[u8]) -> Result<FrameKind, DecodeError> {
    let kind = match raw.len() {
        REALTIME_LEN => FrameKind::Realtime,
        CAPACITY_LEN => FrameKind::Capacity,
        len => return Err(DecodeError::UnknownLength(len)),
    };

    let mut fields = Fields::new(raw);
    record.header = Some(FrameHeader {
        address: fields.u8("address")?,
        command: fields.u8("command")?,
        version: fields.u8("version")?,
        length: fields.u16("length")?,
    });

    match kind {
        FrameKind::Realtime => decode_realtime(record, &mut fields)?,
        FrameKind::Capacity => decode_capacity(record, &mut fields)?,
    }
    record.last_update = Some(Instant::now());
    Ok(kind)
}

fn decode_realtime(record: &mut TelemetryRecord, fields: &mut Fields) -> Result<(), DecodeError> {
    fields.skip(TIMESTAMP_WIDTH);

    let cells_end = fields.offset + CELL_REGION_SLOTS * 4;
    let mut total = 0.0;
    for cell in record.cell_voltages.iter_mut() {
        let volts = f64::from(fields.u16("cell voltage")?) / 1000.0;
        *cell = Some(volts);
        total += volts;
        record.total_voltage = Some(total);
    }
    fields.offset = cells_end;

    let charging = plausible_current("charging", f64::from(fields.u16("charging current")?) / 100.0);
    record.charging_current = Some(charging);
    let discharging = plausible_current("discharging", f64::from(fields.u16("discharging current")?) / 100.0);
    record.discharging_current = Some(discharging);
    record.pack_current = Some(-charging + discharging);

    for temperature in record.temperatures.iter_mut() {
        *temperature = Some(i32::from(fields.u8("temperature")?) - 40);
    }

    record.working_state = Some(fields.u16("working state")?);
    record.alarm = Some(fields.u8("alarm")?);
    record.balance_state = Some(fields.u16("balance state")?);
    record.discharge_cycles = Some(fields.u16("discharge cycles")?);
    record.charge_cycles = Some(fields.u16("charge cycles")?);
    record.state_of_charge = Some(fields.u8("state of charge")?);
    Ok(())
}

fn decode_capacity(record: &mut TelemetryRecord, fields: &mut Fields) -> Result<(), DecodeError> {
    fields.skip(RESERVED_WIDTH);
    record.remaining_capacity = Some(f64::from(fields.u16("remaining capacity")?) / 10.0);
    record.total_capacity = Some(f64::from(fields.u16("total capacity")?) / 10.0);
    record.designed_capacity = Some(f64::from(fields.u16("designed capacity")?) / 10.0);
    Ok(())
}

fn plausible_current(direction: &str, amps: f64) -> f64 {
    if amps > MAX_PLAUSIBLE_CURRENT_A {
        tracing::info!("{direction} current too big: {amps}");
        0.0
    } else {
        amps
    }
}

/// Sequential reader of the hex fields of one frame.
struct Fields<'a> {
    raw: &'a [u8],
    offset: usize,
}

impl<'a> Fields<'a> {
    fn new(raw: &'a [u8]) -> Self {
        // Skip the ':' start byte.
        Self { raw, offset: 1 }
    }

    fn skip(&mut self, width: usize) {
        self.offset += width;
    }

    fn take<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], DecodeError> {
        let offset = self.offset;
        let text = self
            .raw
            .get(offset..offset + 2 * N)
            .ok_or(DecodeError::Truncated { field, offset })?;
        let mut bytes = [0; N];
        hex::decode_to_slice(text, &mut bytes)
            .map_err(|source| DecodeError::InvalidField { field, offset, source })?;
        self.offset += 2 * N;
        Ok(bytes)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        let [value] = self.take::<1>(field)?;
        Ok(value)
    }

    fn u16(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.take::<2>(field)?))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A realtime frame with the given cells (mV as hex text), currents and state of charge.
    pub(crate) fn realtime_frame(cells: &[&str], charging: &str, discharging: &str, soc: &str) -> Vec<u8> {
        let mut frame = String::from(":010250");
        frame += "0070";
        frame += "20240101120000";
        for slot in 0..CELL_REGION_SLOTS {
            frame += cells.get(slot).copied().unwrap_or("0000");
        }
        frame += charging;
        frame += discharging;
        frame += "3C3D3E3F";
        frame += "F003";
        frame += "00";
        frame += "0000";
        frame += "0012";
        frame += "0034";
        frame += soc;
        while frame.len() < REALTIME_LEN - 1 {
            frame.push('0');
        }
        frame.push('~');
        frame.into_bytes()
    }

    /// A capacity frame with the given remaining capacity (Ah/10 as hex text).
    pub(crate) fn capacity_frame(remaining: &str) -> Vec<u8> {
        let frame = format!(":0103500010FFFF{remaining}07D007D000~");
        frame.into_bytes()
    }

    fn cells_3v3() -> Vec<&'static str> {
        vec!["0CE4", "0CE5", "0CE6", "0CE7"]
    }

    #[test]
    fn test_frame_builders() {
        assert_eq!(realtime_frame(&[], "0000", "0000", "64").len(), REALTIME_LEN);
        assert_eq!(capacity_frame("03E8").len(), CAPACITY_LEN);
    }

    #[test]
    fn test_decode_realtime() {
        let mut record = TelemetryRecord::default();
        let raw = realtime_frame(&cells_3v3(), "0000", "01F4", "55");
        assert_eq!(decode(&mut record, &raw), Ok(FrameKind::Realtime));

        assert_eq!(
            record.header,
            Some(FrameHeader {
                address: 1,
                command: 2,
                version: 0x50,
                length: 0x70
            })
        );
        assert_eq!(record.cell_voltages[0], Some(3.3));
        assert_eq!(record.cell_voltages[3], Some(3.303));
        assert_eq!(record.cell_voltages[4], Some(0.0));
        assert!((record.total_voltage.unwrap() - 13.206).abs() < 1e-9);
        assert_eq!(record.charging_current, Some(0.0));
        assert_eq!(record.discharging_current, Some(5.0));
        assert_eq!(record.pack_current, Some(5.0));
        assert_eq!(record.temperatures, [Some(20), Some(21), Some(22), Some(23)]);
        assert_eq!(record.working_state, Some(0xF003));
        assert_eq!(record.alarm, Some(0));
        assert_eq!(record.balance_state, Some(0));
        assert_eq!(record.discharge_cycles, Some(0x12));
        assert_eq!(record.charge_cycles, Some(0x34));
        assert_eq!(record.state_of_charge, Some(0x55));
        assert!(record.last_update.is_some());
    }

    #[test]
    fn test_decode_capacity() {
        let mut record = TelemetryRecord::default();
        assert_eq!(decode(&mut record, &capacity_frame("03E8")), Ok(FrameKind::Capacity));
        assert_eq!(record.remaining_capacity, Some(100.0));
        assert_eq!(record.total_capacity, Some(200.0));
        assert_eq!(record.designed_capacity, Some(200.0));
        assert_eq!(record.total_voltage, None);
        assert!(record.last_update.is_some());
    }

    #[test]
    fn test_only_parsed_cells_are_summed() {
        let mut record = TelemetryRecord::default();
        let raw = realtime_frame(&["03E8", "ZZZZ"], "0000", "0000", "64");

        let result = decode(&mut record, &raw);

        assert!(matches!(
            result,
            Err(DecodeError::InvalidField {
                field: "cell voltage",
                offset: 29,
                ..
            })
        ));
        assert_eq!(record.total_voltage, Some(1.0));
        assert_eq!(record.cell_voltages[0], Some(1.0));
        assert_eq!(record.cell_voltages[1], None);
        assert_eq!(record.state_of_charge, None);
        assert_eq!(record.last_update, None);
    }

    #[test]
    fn test_bad_first_cell_keeps_total_voltage() {
        let mut record = TelemetryRecord::default();
        decode(&mut record, &realtime_frame(&["0CE4"; 4], "0000", "0000", "64")).unwrap();
        let before = record.total_voltage;

        let raw = realtime_frame(&["ZZZZ"], "0000", "0000", "64");
        assert!(decode(&mut record, &raw).is_err());
        assert_eq!(record.total_voltage, before);

        let mut fresh = TelemetryRecord::default();
        assert!(decode(&mut fresh, &raw).is_err());
        assert_eq!(fresh.total_voltage, None);
    }

    #[test]
    fn test_total_voltage_sums_single_cell() {
        let mut record = TelemetryRecord::default();
        let raw = realtime_frame(&["03E8"], "0000", "0000", "64");
        decode(&mut record, &raw).unwrap();
        assert_eq!(record.total_voltage, Some(1.0));
    }

    #[test]
    fn test_implausible_currents_are_clamped() {
        let mut record = TelemetryRecord::default();
        // 0xC350 = 50000 -> 500.00 A is still plausible, 0xC351 is not
        let raw = realtime_frame(&cells_3v3(), "C351", "C350", "64");
        decode(&mut record, &raw).unwrap();
        assert_eq!(record.charging_current, Some(0.0));
        assert_eq!(record.discharging_current, Some(500.0));
        assert_eq!(record.pack_current, Some(500.0));

        let raw = realtime_frame(&cells_3v3(), "03E8", "FFFF", "64");
        decode(&mut record, &raw).unwrap();
        assert_eq!(record.charging_current, Some(10.0));
        assert_eq!(record.discharging_current, Some(0.0));
        assert_eq!(record.pack_current, Some(-10.0));
    }

    #[test]
    fn test_pack_current_is_discharge_minus_charge() {
        for (charging, discharging) in [("0000", "0000"), ("0190", "0064"), ("0064", "0190"), ("1388", "1388")] {
            let mut record = TelemetryRecord::default();
            decode(&mut record, &realtime_frame(&cells_3v3(), charging, discharging, "64")).unwrap();
            let expected = -record.charging_current.unwrap() + record.discharging_current.unwrap();
            assert_eq!(record.pack_current, Some(expected));
        }
    }

    #[test]
    fn test_unknown_length_changes_nothing() {
        let mut record = TelemetryRecord::default();
        decode(&mut record, &realtime_frame(&cells_3v3(), "0000", "0000", "64")).unwrap();
        let before = record.clone();

        for len in [0, 1, 29, 31, 64, 127, 129, 256] {
            let raw = vec![b'0'; len];
            assert_eq!(decode(&mut record, &raw), Err(DecodeError::UnknownLength(len)));
            assert_eq!(record, before);
        }
    }

    #[test]
    fn test_invalid_header_keeps_previous_values() {
        let mut record = TelemetryRecord::default();
        decode(&mut record, &capacity_frame("03E8")).unwrap();
        let updated = record.last_update;

        let mut raw = capacity_frame("0001");
        raw[1] = b'x';
        assert!(decode(&mut record, &raw).is_err());
        assert_eq!(record.remaining_capacity, Some(100.0));
        assert_eq!(record.last_update, updated);
    }
}
