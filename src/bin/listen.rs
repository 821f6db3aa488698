//! Discovery Listener
//!
//! Prints collector announcements received on the discovery port.
//!
//! ```text
//! beacon-listen [--port <port>] [--version <version>] [--scan]
//! ```

use anyhow::{bail, Context, Result};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use collector_beacon::{
    config::BeaconConfig,
    discovery::{CollectorStatus, DiscoveryListener},
};

/// Receive attempts per scan, matching a ~5s discovery window
const SCAN_ATTEMPTS: usize = 50;
const SCAN_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct Args {
    port: Option<u16>,
    version: Option<String>,
    scan: bool,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-p" | "--port" => {
                    let port = args.next().context("--port needs a value")?;
                    parsed.port = Some(port.parse().context("invalid port")?);
                }
                "-v" | "--version" => {
                    parsed.version = Some(args.next().context("--version needs a value")?);
                }
                "--scan" => parsed.scan = true,
                "-h" | "--help" => {
                    println!("usage: beacon-listen [--port <port>] [--version <version>] [--scan]");
                    std::process::exit(0);
                }
                other => bail!("unexpected argument: {}", other),
            }
        }
        Ok(parsed)
    }
}

fn print_collector(collector: &CollectorStatus) {
    println!(
        "  pid {:>7}  {:<10} version {:<12} otlp {:<24} from {}",
        collector.pid,
        collector.status,
        collector.version,
        collector.otlp_endpoint,
        collector.source
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse(std::env::args().skip(1))?;
    let config = BeaconConfig::load(None)?;
    let port = args.port.unwrap_or(config.discovery.port);

    let mut listener = DiscoveryListener::bind(port)?;
    tracing::info!("Listening for collector announcements on port {}", port);

    if args.scan {
        let collectors: Vec<CollectorStatus> = match &args.version {
            Some(version) => listener
                .find_collector(version, SCAN_ATTEMPTS, SCAN_DELAY)
                .await?
                .into_iter()
                .collect(),
            None => listener.running_collectors(SCAN_ATTEMPTS, SCAN_DELAY).await?,
        };

        println!("\n=== Running Collectors ===");
        if collectors.is_empty() {
            println!("  (none found)");
        }
        for collector in &collectors {
            print_collector(collector);
        }
        return Ok(());
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = listener.recv_announcement(Duration::from_secs(1)) => {
                let (announcement, source) = match received {
                    Ok(Some(received)) => received,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!("Dropped datagram: {}", e);
                        continue;
                    }
                };

                if args.version.as_deref().is_some_and(|v| v != announcement.version) {
                    continue;
                }

                println!(
                    "{} pid={} version={} otlp={} logs={}",
                    announcement.status,
                    announcement.pid,
                    announcement.version,
                    announcement.otlp_endpoint,
                    announcement.logs.len()
                );
                if let Some(last) = announcement.logs.last() {
                    println!("    last log from {}: {}", source, last.message);
                }
            }
        }
    }

    Ok(())
}
