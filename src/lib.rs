//! # Collector Beacon
//!
//! Announces a telemetry collector's liveness and readiness on the local
//! network with periodic UDP broadcasts, so other processes can find it
//! without a central registry.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           COLLECTOR HOST                             │
//! │                                                                      │
//! │  ┌──────────────┐   ┌──────────────┐                                 │
//! │  │ tracing      │   │ child stdout │   log sources (logs::tap,       │
//! │  │ events       │   │ / stderr     │   logs::child)                  │
//! │  └──────┬───────┘   └──────┬───────┘                                 │
//! │         └────────┬─────────┘                                         │
//! │                  ▼  unbounded channel                                │
//! │         ┌─────────────────┐                                          │
//! │         │   Log Watcher   │── marker seen ──▶ status = READY         │
//! │         └────────┬────────┘                                          │
//! │                  │ append                                            │
//! │                  ▼                                                   │
//! │  ┌────────────────────────────────────────┐                          │
//! │  │ AnnouncementState (status::state)      │                          │
//! │  │  status · pid · version · otlpEndpoint │                          │
//! │  │  recent logs (status::ring)            │                          │
//! │  └────────────────────┬───────────────────┘                          │
//! │                       │ snapshot every tick                          │
//! │                       ▼                                              │
//! │  ┌────────────────────────────────────────┐                          │
//! │  │ Heartbeat (heartbeat)                  │                          │
//! │  │  encode JSON ─▶ send ─▶ failure count  │── ceiling ─▶ fatal error │
//! │  └────────────────────┬───────────────────┘                          │
//! │                       ▼                                              │
//! │  ┌────────────────────────────────────────┐                          │
//! │  │ Raw broadcast socket (network::raw)    │                          │
//! │  │  SO_BROADCAST · optional bind · sendto │                          │
//! │  └────────────────────┬───────────────────┘                          │
//! └───────────────────────┼──────────────────────────────────────────────┘
//!                         │ UDP broadcast, discovery port
//!                         ▼
//!          ┌─────────────────────────────────┐
//!          │ DiscoveryListener (discovery)   │  any process on the LAN
//!          └─────────────────────────────────┘
//! ```

pub mod config;
#[cfg(feature = "listener")]
pub mod discovery;
pub mod error;
pub mod extension;
pub mod heartbeat;
pub mod logs;
pub mod network;
pub mod shutdown;
pub mod status;

pub use error::{Error, Result};
pub use extension::{bootstrap, Extension};

/// Application-wide constants
pub mod constants {
    /// Default UDP port announcements are broadcast on
    pub const DEFAULT_DISCOVERY_PORT: u16 = 8688;

    /// Default heartbeat interval in milliseconds
    pub const DEFAULT_INTERVAL_MS: u64 = 100;

    /// Default number of consecutive send failures before giving up
    pub const DEFAULT_FAILURE_CEILING: u32 = 10;

    /// Default number of recent log lines carried per announcement
    pub const DEFAULT_LOG_CAPACITY: usize = 20;

    /// Log line the collector prints once its pipelines are running
    pub const READINESS_MARKER: &str = "Everything is ready. Begin running and processing data.";

    /// Environment variable holding the collector's OTLP endpoint
    pub const DEFAULT_OTLP_ENDPOINT_ENV: &str = "BEAM_OTLP_HTTP_ENDPOINT";

    /// Largest UDP payload over IPv4
    pub const MAX_DATAGRAM_SIZE: usize = 65_507;

    /// Smallest configurable datagram limit
    pub const MIN_DATAGRAM_SIZE: usize = 64;

    /// Kernel receive buffer requested by the discovery listener
    pub const RECEIVE_BUFFER_SIZE: usize = 256 * 1024;
}
