use bluest::Uuid;
use thiserror::Error;

/// Failures of the radio link. These abort the current exchange but never the driver.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(String),
    #[error("the device does not expose characteristic {0}")]
    CharacteristicNotFound(Uuid),
    #[error("failed to write to {uuid}: {reason}")]
    Write { uuid: Uuid, reason: String },
    #[error("failed to subscribe to {uuid}: {reason}")]
    Subscribe { uuid: Uuid, reason: String },
    #[error("failed to disconnect: {0}")]
    Disconnect(String),
    #[error("not connected")]
    NotConnected,
    #[error("notification stream closed")]
    NotificationsClosed,
    #[error(transparent)]
    Ble(#[from] bluest::Error),
}

/// Why a frame could not be (fully) decoded.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("unrecognized frame length {0}")]
    UnknownLength(usize),
    #[error("field `{field}` at offset {offset} runs past the end of the frame")]
    Truncated { field: &'static str, offset: usize },
    #[error("field `{field}` at offset {offset} is not valid hex: {source}")]
    InvalidField {
        field: &'static str,
        offset: usize,
        #[source]
        source: hex::FromHexError,
    },
    #[error("response envelope invalid: {0}")]
    Envelope(&'static str),
    #[error("response for unknown register {0}")]
    UnknownRegister(u8),
}

/// Outcome of a poll that produced no usable reading.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("no reading available")]
    NoData,
    #[error("no driver for device {0}")]
    UnknownDevice(String),
    #[error("device name {0:?} does not identify a supported model")]
    UnsupportedName(Option<String>),
}
