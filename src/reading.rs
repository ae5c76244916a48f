/// The reported state of the battery.
///
/// Every field is optional: a vendor that does not report a value, or a poll
/// that only got part of the answer, leaves it unset rather than zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BmsReading {
    /// Pack voltage in V
    pub voltage: Option<f64>,
    /// Voltage spread across the cells in V
    pub delta_voltage: Option<f64>,
    /// Pack current in A. Positive while discharging, negative while charging.
    pub current: Option<f64>,
    /// State of charge in %
    pub battery_level: Option<u16>,
    /// Remaining charge in Ah
    pub cycle_charge: Option<f64>,
    /// Remaining energy in Wh
    pub cycle_capacity: Option<f64>,
    /// First temperature sensor in °C
    pub temperature: Option<f64>,
    /// Lifetime number of charge cycles
    pub cycles: Option<u32>,
    /// Power in W, same sign as `current`
    pub power: Option<f64>,
    pub battery_charging: Option<bool>,
    /// Estimated time until empty in s
    pub runtime: Option<u32>,
    /// Number of cells the vendor publishes
    pub cell_count: Option<usize>,
    /// Voltage of each published cell in V
    pub cells: Vec<Option<f64>>,
    /// Signal strength of the last advertisement in dBm
    pub rssi: Option<i16>,
}

impl BmsReading {
    /// The voltages of the cells that reported one.
    pub fn cell_voltages(&self) -> Vec<f64> {
        self.cells.iter().flatten().copied().collect()
    }

    /// Whether the poll produced anything at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fill in the values that can be computed from the ones already present.
    ///
    /// A value is only derived when all of its inputs are present and the
    /// vendor did not report it directly.
    pub fn calc_values(&mut self) {
        if self.power.is_none() {
            self.power = self.voltage.zip(self.current).map(|(v, a)| v * a);
        }
        if self.battery_charging.is_none() {
            self.battery_charging = self.current.map(|a| a < 0.0);
        }
        if self.cycle_capacity.is_none() {
            self.cycle_capacity = self.voltage.zip(self.cycle_charge).map(|(v, ah)| v * ah);
        }
        if self.runtime.is_none() {
            self.runtime = match (self.cycle_charge, self.current) {
                (Some(ah), Some(a)) if a > 0.0 => Some((ah / a * 3600.0) as u32),
                _ => None,
            };
        }
        if self.delta_voltage.is_none() {
            let cells = self.cell_voltages();
            if cells.len() >= 2 {
                let max = cells.iter().copied().fold(f64::MIN, f64::max);
                let min = cells.iter().copied().fold(f64::MAX, f64::min);
                self.delta_voltage = Some(max - min);
            }
        }
    }
}
