//! Read status data from LiFePO4 Battery Management Systems over Bluetooth Low Energy
//!
//! Supported models:
//!
//! - Supervolt "Black" batteries, advertised as `libatt…`. These use the NordicUART protocol for serial
//!   communication and answer two fixed requests with ASCII-hex frames.
//! - Offgridtec LiFePo4 Smart Pro batteries (type A and B), advertised as `SmartBat-A…` / `SmartBat-B…`.
//!   These are read register by register with messages scrambled using a key derived from the device name.
//!
//! Currently the following data can be accessed, where the model reports it:
//!
//! - State of charge (%)
//! - Remaining charge (Ah) and energy (Wh)
//! - Cycles (count)
//! - Cell voltages (v)
//! - Battery voltage (v), current (A) and power (W)
//! - Temperature (°C)
//! - Estimated runtime (s)
//!
//! # Example
//!
//! ```no_run
//! # use std::time::Duration;
//! use bmsread::{BluestTransport, Monitor, Registry};
//!
//! # #[tokio::main]
//! # pub async fn main() -> anyhow::Result<()> {
//!     let adapter = BluestTransport::default_adapter().await?;
//!     let mut monitor = Monitor::new(Registry::default());
//!     BluestTransport::scan(&adapter, Duration::from_secs(30), |advertisement, device| {
//!         monitor.observe(&advertisement, |_| BluestTransport::new(adapter.clone(), device));
//!     })
//!     .await?;
//!     loop {
//!         for (address, reading) in monitor.poll_all().await {
//!             println!("{address}: {reading:?}");
//!         }
//!         tokio::time::sleep(Duration::from_secs(30)).await;
//!     }
//! # }
//! ```

mod driver;
mod error;
mod monitor;
pub mod ogt;
mod reading;
pub mod registry;
pub mod supervolt;
pub mod transport;

pub use driver::{Bms, BmsDriver, DriverConfig, LinkState, Session};
pub use error::{DecodeError, PollError, TransportError};
pub use monitor::Monitor;
pub use reading::BmsReading;
pub use registry::{Advertisement, BmsKind, Registry};
pub use transport::{BluestTransport, Transport};
