//! Heartbeat to a real UDP listener on loopback
#![cfg(feature = "listener")]

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use collector_beacon::{
    config::BeaconConfig,
    discovery::DiscoveryListener,
    extension::initial_state,
    logs::{log_channel, LogEvent},
    status::Status,
    Extension,
};
use std::sync::Arc;
use tokio::time::Instant;

fn loopback_config(port: u16) -> BeaconConfig {
    let mut config = BeaconConfig::default();
    config.discovery.host = Some("127.0.0.1".into());
    config.discovery.port = port;
    config.heartbeat.interval_ms = 10;
    config.heartbeat.failure_ceiling = 3;
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_announcements_arrive_within_window() {
    let mut listener =
        DiscoveryListener::bind_addr(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = loopback_config(port);

    let socket = collector_beacon::bootstrap(&config).unwrap();
    let (tx, rx) = log_channel();
    let mut extension = Extension::new(&config, initial_state(&config), Arc::new(socket), rx);
    extension.start().unwrap();

    tx.send(LogEvent::new("Starting otlp receiver")).unwrap();

    let mut received = Vec::new();
    let deadline = Instant::now() + Duration::from_millis(100);
    while Instant::now() < deadline {
        if received.len() == 3 {
            tx.send(LogEvent::new(config.logs.readiness_marker.clone())).unwrap();
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if let Some((announcement, _)) = listener.recv_announcement(remaining).await.unwrap() {
            received.push(announcement);
        }
    }

    extension.shutdown();
    extension.wait().await.unwrap();

    assert!(received.len() >= 5, "only {} announcements", received.len());

    let pid = std::process::id();
    assert!(received.iter().all(|a| a.pid == pid));
    assert!(received
        .windows(2)
        .all(|w| w[0].status.ordinal() <= w[1].status.ordinal()));
    assert!(received.iter().all(|a| a.status != Status::Unknown));
    assert!(received
        .iter()
        .any(|a| a.logs.iter().any(|l| l.message == "Starting otlp receiver")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_listener_finds_ready_collector() {
    let mut listener =
        DiscoveryListener::bind_addr(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = loopback_config(port);

    let (tx, rx) = log_channel();
    tx.send(LogEvent::new(config.logs.readiness_marker.clone())).unwrap();
    let mut extension = Extension::launch(&config, rx).unwrap();

    let mut found = None;
    for _ in 0..20 {
        match listener
            .find_collector(&config.announce.version, 1, Duration::from_millis(200))
            .await
            .unwrap()
        {
            Some(collector) if collector.is_ready => {
                found = Some(collector);
                break;
            }
            _ => continue,
        }
    }

    extension.shutdown();
    extension.wait().await.unwrap();

    let collector = found.expect("no ready collector announced");
    assert_eq!(collector.pid, std::process::id());
    assert_eq!(collector.version, env!("CARGO_PKG_VERSION"));
}
