//! The Offgridtec register protocol.
//!
//! Every message is ASCII XOR-ed byte by byte with a key derived from the
//! device name. A query is `<header><register:02X><length:02X>`. An answer is
//! `+RD,<register:02X><value, 2 bytes little endian as hex>[<multiplier:02X>]\r\n`;
//! when the multiplier is present the value is signed.

use crate::error::DecodeError;
use crate::reading::BmsReading;

const CRYPT_SEQ: [u8; 16] = [2, 5, 4, 3, 1, 4, 1, 6, 8, 3, 7, 2, 5, 8, 9, 3];
const NAME_PREFIX_LEN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    A,
    B,
}

/// What a register holds and how its raw value converts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    BatteryLevel,
    CycleCharge,
    Voltage,
    Temperature,
    Current,
    Runtime,
    Cycles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    pub address: u8,
    /// Number of bytes the device is asked for
    pub len: u8,
    pub field: Field,
}

const fn reg(address: u8, len: u8, field: Field) -> Register {
    Register { address, len, field }
}

const TYPE_A_REGISTERS: [Register; 7] = [
    reg(2, 1, Field::BatteryLevel),
    reg(4, 3, Field::CycleCharge),
    reg(8, 2, Field::Voltage),
    reg(12, 2, Field::Temperature),
    reg(16, 3, Field::Current),
    reg(24, 2, Field::Runtime),
    reg(44, 2, Field::Cycles),
];

const TYPE_B_REGISTERS: [Register; 7] = [
    reg(8, 2, Field::Temperature),
    reg(9, 2, Field::Voltage),
    reg(10, 3, Field::Current),
    reg(13, 1, Field::BatteryLevel),
    reg(15, 3, Field::CycleCharge),
    reg(18, 2, Field::Runtime),
    reg(23, 2, Field::Cycles),
];

impl Variant {
    pub fn header(self) -> &'static str {
        match self {
            Variant::A => "+RAA",
            Variant::B => "+R16",
        }
    }

    pub fn registers(self) -> &'static [Register] {
        match self {
            Variant::A => &TYPE_A_REGISTERS,
            Variant::B => &TYPE_B_REGISTERS,
        }
    }

    pub fn register(self, address: u8) -> Option<&'static Register> {
        self.registers().iter().find(|r| r.address == address)
    }
}

/// Variant and scrambling key of a device named `SmartBat-<variant><id>`.
pub fn parse_name(name: &str) -> Option<(Variant, u8)> {
    let rest = name.get(NAME_PREFIX_LEN..)?;
    let mut chars = rest.chars();
    let (variant, offset) = match chars.next()? {
        'A' => (Variant::A, 5),
        'B' => (Variant::B, 8),
        _ => return None,
    };
    let id: u32 = chars.as_str().parse().ok()?;
    let key: u32 = format!("{id:04X}")
        .chars()
        .filter_map(|digit| digit.to_digit(16))
        .map(|digit| u32::from(CRYPT_SEQ[digit as usize]))
        .sum::<u32>()
        + offset;
    u8::try_from(key).ok().map(|key| (variant, key))
}

fn scramble(data: &[u8], key: u8) -> Vec<u8> {
    data.iter().map(|byte| byte ^ key).collect()
}

/// The scrambled query for one register.
pub fn command(variant: Variant, register: &Register, key: u8) -> Vec<u8> {
    let text = format!("{}{:02X}{:02X}", variant.header(), register.address, register.len);
    scramble(text.as_bytes(), key)
}

/// Unscramble an answer into its register address and raw value.
pub fn response(raw: &[u8], key: u8) -> Result<(u8, i64), DecodeError> {
    let plain = scramble(raw, key);
    let msg = std::str::from_utf8(&plain).map_err(|_| DecodeError::Envelope("not ASCII"))?;
    if !msg.starts_with("+RD,") || !msg.ends_with("\r\n") || msg.len() < 12 {
        return Err(DecodeError::Envelope("expected +RD,<register><value> and CRLF"));
    }

    let address = hex_bytes::<1>(msg, 4, "register")?[0];
    let value = hex_bytes::<2>(msg, 6, "value")?;
    let value = if msg.len() > 12 {
        let [multiplier] = hex_bytes::<1>(msg, 10, "multiplier")?;
        i64::from(i16::from_le_bytes(value)) * i64::from(multiplier)
    } else {
        i64::from(u16::from_le_bytes(value))
    };
    Ok((address, value))
}

/// Unscramble an answer and look up the register it belongs to.
pub fn decode(variant: Variant, raw: &[u8], key: u8) -> Result<(Field, i64), DecodeError> {
    let (address, value) = response(raw, key)?;
    let register = variant.register(address).ok_or(DecodeError::UnknownRegister(address))?;
    Ok((register.field, value))
}

fn hex_bytes<const N: usize>(msg: &str, offset: usize, field: &'static str) -> Result<[u8; N], DecodeError> {
    let text = msg
        .get(offset..offset + 2 * N)
        .ok_or(DecodeError::Truncated { field, offset })?;
    let mut bytes = [0; N];
    hex::decode_to_slice(text, &mut bytes)
        .map_err(|source| DecodeError::InvalidField { field, offset, source })?;
    Ok(bytes)
}

impl Field {
    /// Store the converted `raw` value in the matching reading field.
    pub fn apply(self, reading: &mut BmsReading, raw: i64) {
        let value = raw as f64;
        match self {
            Field::BatteryLevel => reading.battery_level = u16::try_from(raw).ok(),
            Field::CycleCharge => reading.cycle_charge = Some(value / 1000.0),
            Field::Voltage => reading.voltage = Some(value / 1000.0),
            Field::Temperature => reading.temperature = Some(((value * 0.1 - 273.15) * 10.0).round() / 10.0),
            Field::Current => reading.current = Some(value / 1000.0),
            Field::Runtime => reading.runtime = u32::try_from(raw * 60).ok(),
            Field::Cycles => reading.cycles = u32::try_from(raw).ok(),
        }
    }
}
