//! Announcement wire format
//!
//! Each datagram is one JSON object:
//!
//! ```text
//! {"status":"READY","pid":4242,"version":"0.1.0","otlpEndpoint":"127.0.0.1:4318","logs":[{"message":"..."}]}
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::WireError;
use crate::logs::LogEvent;

/// Collector readiness as seen on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    NotReady,
    Ready,
    /// Any status string this build does not recognize
    #[serde(other)]
    Unknown,
}

impl Status {
    /// Position in the readiness progression; `Unknown` sorts last
    pub fn ordinal(self) -> u8 {
        match self {
            Status::NotReady => 0,
            Status::Ready => 1,
            Status::Unknown => 2,
        }
    }

    pub fn from_ordinal(ordinal: u8) -> Self {
        match ordinal {
            0 => Status::NotReady,
            1 => Status::Ready,
            _ => Status::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::NotReady => "NOT_READY",
            Status::Ready => "READY",
            Status::Unknown => "UNKNOWN",
        }
    }

    pub fn is_ready(self) -> bool {
        self == Status::Ready
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One immutable heartbeat record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub status: Status,
    pub pid: u32,
    pub version: String,
    #[serde(default)]
    pub otlp_endpoint: String,
    #[serde(default)]
    pub logs: Vec<LogEvent>,
}

impl Announcement {
    pub fn encode(&self) -> Result<Bytes, WireError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| WireError::Encode(e.to_string()))
    }

    /// Encode, dropping the oldest log lines until the payload fits `max`
    pub fn encode_bounded(&self, max: usize) -> Result<Bytes, WireError> {
        let encoded = self.encode()?;
        if encoded.len() <= max {
            return Ok(encoded);
        }

        let mut trimmed = self.clone();
        let mut size = encoded.len();
        while !trimmed.logs.is_empty() {
            trimmed.logs.remove(0);
            let encoded = trimmed.encode()?;
            if encoded.len() <= max {
                tracing::debug!(
                    dropped = self.logs.len() - trimmed.logs.len(),
                    "Trimmed log lines to fit announcement datagram"
                );
                return Ok(encoded);
            }
            size = encoded.len();
        }

        Err(WireError::TooLarge { size, max })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(bytes).map_err(|e| WireError::Decode(e.to_string()))
    }
}
