//! Collector Beacon
//!
//! Broadcasts the collector's status on the discovery port. When given a
//! command after `--`, starts it as the collector and watches its output for
//! the readiness marker.
//!
//! ```text
//! beacon [--config <path>] [-- <collector> [args...]]
//! ```

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use collector_beacon::{
    bootstrap,
    config::BeaconConfig,
    extension::initial_state,
    logs::{log_channel, ChildCollector, LogTap},
    Extension,
};

/// Command line arguments
#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    command: Option<(String, Vec<String>)>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-c" | "--config" => {
                    let path = args.next().context("--config needs a path")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                "--" => {
                    let program = args.next().context("expected a collector command after --")?;
                    parsed.command = Some((program, args.collect()));
                    break;
                }
                "-h" | "--help" => {
                    println!("usage: beacon [--config <path>] [-- <collector> [args...]]");
                    std::process::exit(0);
                }
                other => bail!("unexpected argument: {}", other),
            }
        }
        Ok(parsed)
    }
}

/// Why the beacon is stopping
enum Exit {
    Heartbeat(collector_beacon::Result<()>),
    Interrupted,
    ChildExited(Option<ExitStatus>),
}

async fn child_exit(child: Option<&mut ChildCollector>) -> Option<ExitStatus> {
    match child {
        Some(child) => child.wait().await.ok(),
        None => std::future::pending().await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse(std::env::args().skip(1))?;
    let config = BeaconConfig::load(args.config.as_deref())?;

    // Initialize logging; the tap feeds the log watcher
    let (log_tx, log_rx) = log_channel();
    let tap = if config.logs.capture_self {
        LogTap::capture_all(log_tx.clone())
    } else {
        LogTap::new(log_tx.clone())
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(tap)
        .init();

    tracing::info!("Starting collector beacon");

    let socket = match bootstrap(&config) {
        Ok(socket) => socket,
        Err(e) => {
            tracing::error!("Broadcast setup failed, terminating: {}", e);
            std::process::exit(1);
        }
    };

    let mut extension = Extension::new(&config, initial_state(&config), Arc::new(socket), log_rx);
    extension.start()?;

    let mut child = match args.command {
        Some((program, rest)) => Some(ChildCollector::spawn(&program, &rest, log_tx)?),
        None => None,
    };

    let exit = tokio::select! {
        result = extension.wait() => Exit::Heartbeat(result),
        _ = tokio::signal::ctrl_c() => Exit::Interrupted,
        status = child_exit(child.as_mut()) => Exit::ChildExited(status),
    };

    let mut code = match exit {
        Exit::Heartbeat(Ok(())) => 0,
        Exit::Heartbeat(Err(e)) => {
            tracing::error!("Collector beacon terminating: {}", e);
            1
        }
        Exit::Interrupted => {
            tracing::info!("Interrupted");
            0
        }
        Exit::ChildExited(status) => {
            tracing::info!(status = ?status, "Collector process exited");
            status.and_then(|s| s.code()).unwrap_or(1)
        }
    };

    extension.shutdown();
    if let Err(e) = extension.wait().await {
        tracing::error!("Collector beacon stopped with error: {}", e);
        if e.is_fatal() {
            code = 1;
        }
    }
    if let Some(child) = child.as_mut() {
        let _ = child.kill().await;
    }

    let stats = extension.stats().snapshot();
    tracing::info!(
        "Stats: {} sent, {} failed, {} skipped",
        stats.sent,
        stats.failed,
        stats.skipped
    );

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
