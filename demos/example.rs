use std::time::Duration;

use bmsread::{BluestTransport, Monitor, Registry};

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let adapter = BluestTransport::default_adapter().await?;
    let mut monitor = Monitor::new(Registry::default());
    BluestTransport::scan(&adapter, Duration::from_secs(30), |advertisement, device| {
        monitor.observe(&advertisement, |_| BluestTransport::new(adapter.clone(), device));
    })
    .await?;

    loop {
        for (address, reading) in monitor.poll_all().await {
            println!("{address}: {reading:?}");
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}
