//! Error types for the collector beacon

use thiserror::Error;

/// Main error type for the beacon
#[derive(Error, Debug)]
pub enum Error {
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    #[error("Broadcaster gave up after {failures} consecutive send failures")]
    FailureCeiling { failures: u32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the process should terminate when this error surfaces.
    ///
    /// Address resolution, socket setup, configuration and the failure
    /// ceiling are fatal. Encoding problems and per-datagram send or receive
    /// errors only cost a single tick or packet.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Wire(_)
                | Error::Network(
                    NetworkError::Send(_)
                        | NetworkError::PacketTooLarge(_)
                        | NetworkError::Receive(_)
                        | NetworkError::InvalidPacket(_)
                )
        )
    }
}

/// Broadcast target resolution errors
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("No up, non-loopback interface with an IPv4 address")]
    NoBroadcastInterface,

    #[error("Interface discovery failed: {0}")]
    InterfaceDiscovery(String),

    #[error("Failed to resolve host {host}: {reason}")]
    HostLookup { host: String, reason: String },

    #[error("Host {0} has no IPv4 address")]
    NotIpv4(String),
}

/// Socket level errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket creation failed: {0}")]
    SocketCreate(String),

    #[error("Enabling broadcast failed: {0}")]
    SetBroadcast(String),

    #[error("Socket bind failed: {0}")]
    Bind(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),

    #[error("Invalid packet: {0}")]
    InvalidPacket(String),
}

/// Announcement encoding errors
#[derive(Error, Debug)]
pub enum WireError {
    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Decoding failed: {0}")]
    Decode(String),

    #[error("Announcement of {size} bytes exceeds the {max} byte datagram limit")]
    TooLarge { size: usize, max: usize },
}

/// Result type alias for the beacon
pub type Result<T> = std::result::Result<T, Error>;
