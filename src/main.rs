use anyhow::bail;
use bmsread::{BluestTransport, BmsReading, Monitor, Registry};
use clap::Parser;
use tokio::time::{sleep, Duration};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bmsread")]
#[command(about = "Poll supported LiFePO4 batteries over Bluetooth Low Energy")]
struct Args {
    /// How long to scan for batteries, in seconds
    #[arg(short, long, default_value_t = 30)]
    scan_secs: u64,

    /// Seconds between polls
    #[arg(short, long, default_value_t = 30)]
    interval: u64,

    /// Only monitor devices whose name contains this text
    #[arg(short, long)]
    name: Option<String>,

    /// Override the per-command response timeout, in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Poll once and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let adapter = BluestTransport::default_adapter().await?;
    let mut monitor = Monitor::new(Registry::default());
    if let Some(secs) = args.timeout {
        monitor = monitor.with_response_timeout(Duration::from_secs(secs));
    }

    println!("Scanning for {}s", args.scan_secs);
    BluestTransport::scan(&adapter, Duration::from_secs(args.scan_secs), |advertisement, device| {
        if let Some(filter) = &args.name {
            if !advertisement.name.as_deref().is_some_and(|name| name.contains(filter.as_str())) {
                return;
            }
        }
        monitor.observe(&advertisement, |_| BluestTransport::new(adapter.clone(), device));
    })
    .await?;

    if monitor.is_empty() {
        bail!("No supported battery found");
    }
    println!("Monitoring {} device(s)", monitor.len());

    loop {
        let mut results = monitor.poll_all().await;
        results.sort_by(|a, b| a.0.cmp(&b.0));
        for (address, result) in results {
            match result {
                Ok(reading) => print_reading(&address, &reading),
                Err(err) => match monitor.link_state(&address) {
                    Some(state) => println!("{address}: {err} (link {state:?})"),
                    None => println!("{address}: {err}"),
                },
            }
        }

        if args.once {
            break;
        }
        sleep(Duration::from_secs(args.interval)).await;
    }

    monitor.stop().await;
    Ok(())
}

fn print_reading(address: &str, reading: &BmsReading) {
    println!("{address}:");
    if let Some(level) = reading.battery_level {
        println!("  State of charge: {level}%");
    }
    if let Some(voltage) = reading.voltage {
        println!("  Voltage:         {voltage:.3} V");
    }
    if let Some(current) = reading.current {
        println!("  Current:         {current:.3} A");
    }
    if let Some(power) = reading.power {
        println!("  Power:           {power:.1} W");
    }
    if let Some(charge) = reading.cycle_charge {
        println!("  Remaining:       {charge:.1} Ah");
    }
    if let Some(temperature) = reading.temperature {
        println!("  Temperature:     {temperature:.1} °C");
    }
    if let Some(cycles) = reading.cycles {
        println!("  Cycles:          {cycles}");
    }
    if let Some(runtime) = reading.runtime {
        println!("  Runtime:         {}h {}m", runtime / 3600, runtime % 3600 / 60);
    }
    let cells = reading.cell_voltages();
    if !cells.is_empty() {
        println!("  Cells:           {cells:?}");
    }
    if let Some(rssi) = reading.rssi {
        println!("  RSSI:            {rssi} dBm");
    }
}
