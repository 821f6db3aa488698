//! Beacon configuration
//!
//! Values come from built-in defaults, an optional TOML file and a small set
//! of environment overrides, applied in that order.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

/// Environment variable overriding the discovery port
pub const ENV_DISCOVERY_PORT: &str = "BEAM_COLLECTOR_DISCOVERY_PORT";

/// Environment variable supplying an explicit destination host
pub const ENV_DISCOVERY_HOST: &str = "BEAM_COLLECTOR_DISCOVERY_HOST";

/// Environment variable selecting the resolution mode (`limited` or `subnet`)
pub const ENV_DISCOVERY_MODE: &str = "BEAM_COLLECTOR_DISCOVERY_MODE";

/// Config file name looked up in the platform config directory
pub const CONFIG_FILE_NAME: &str = "beacon.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub discovery: DiscoveryConfig,
    pub heartbeat: HeartbeatConfig,
    pub logs: LogConfig,
    pub announce: AnnounceConfig,
}

/// How the broadcast destination is chosen when no explicit host is set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveMode {
    /// 255.255.255.255 from an unbound socket
    #[default]
    Limited,
    /// The subnet broadcast of the first usable interface, from a socket
    /// bound to the local outbound address
    Subnet,
}

impl std::str::FromStr for ResolveMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "limited" => Ok(ResolveMode::Limited),
            "subnet" => Ok(ResolveMode::Subnet),
            other => Err(Error::Config(format!("Unknown discovery mode: {}", other))),
        }
    }
}

/// Discovery destination settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub port: u16,
    /// Explicit destination host; wins over interface probing when set
    pub host: Option<String>,
    pub mode: ResolveMode,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_DISCOVERY_PORT,
            host: None,
            mode: ResolveMode::default(),
        }
    }
}

/// Heartbeat loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_ms: u64,
    /// Consecutive send failures tolerated; 0 disables the ceiling
    pub failure_ceiling: u32,
    pub max_datagram_size: usize,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            failure_ceiling: DEFAULT_FAILURE_CEILING,
            max_datagram_size: MAX_DATAGRAM_SIZE,
        }
    }
}

impl HeartbeatConfig {
    /// Tick period, never shorter than 1ms
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    /// The ceiling as an option, `None` meaning unlimited
    pub fn ceiling(&self) -> Option<u32> {
        (self.failure_ceiling > 0).then_some(self.failure_ceiling)
    }
}

/// Log capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub capacity: usize,
    pub readiness_marker: String,
    /// Also capture events emitted by the beacon itself
    pub capture_self: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_LOG_CAPACITY,
            readiness_marker: READINESS_MARKER.to_string(),
            capture_self: false,
        }
    }
}

/// Announcement identity settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnounceConfig {
    pub version: String,
    /// Environment variable holding the OTLP endpoint to advertise
    pub otlp_endpoint_env: String,
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            otlp_endpoint_env: DEFAULT_OTLP_ENDPOINT_ENV.to_string(),
        }
    }
}

impl BeaconConfig {
    /// Load configuration from `path`, or the default location when `None`.
    ///
    /// A missing default file is not an error; a missing explicit file is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(ENV_DISCOVERY_PORT).filter(|v| !v.is_empty()) {
            self.discovery.port = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("Invalid value for port: {}", port)))?;
        }

        if let Some(host) = lookup(ENV_DISCOVERY_HOST).filter(|v| !v.is_empty()) {
            self.discovery.host = Some(host);
        }

        if let Some(mode) = lookup(ENV_DISCOVERY_MODE).filter(|v| !v.is_empty()) {
            self.discovery.mode = mode.parse()?;
        }

        Ok(())
    }

    /// Reject values the beacon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.discovery.port == 0 {
            return Err(Error::Config("discovery.port must be non-zero".into()));
        }
        if self.heartbeat.interval_ms == 0 {
            return Err(Error::Config("heartbeat.interval_ms must be non-zero".into()));
        }
        if self.logs.readiness_marker.is_empty() {
            return Err(Error::Config("logs.readiness_marker must not be empty".into()));
        }
        if self.logs.capacity == 0 {
            return Err(Error::Config("logs.capacity must be at least 1".into()));
        }
        if !(MIN_DATAGRAM_SIZE..=MAX_DATAGRAM_SIZE).contains(&self.heartbeat.max_datagram_size) {
            return Err(Error::Config(format!(
                "heartbeat.max_datagram_size must be within {}..={}",
                MIN_DATAGRAM_SIZE, MAX_DATAGRAM_SIZE
            )));
        }
        Ok(())
    }

    /// Read the advertised OTLP endpoint from the environment
    pub fn otlp_endpoint(&self) -> String {
        std::env::var(&self.announce.otlp_endpoint_env).unwrap_or_default()
    }
}

/// `<config dir>/beacon.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "beamable", "collector-beacon")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = BeaconConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.discovery.port, 8688);
        assert_eq!(config.discovery.mode, ResolveMode::Limited);
        assert_eq!(config.heartbeat.ceiling(), Some(DEFAULT_FAILURE_CEILING));
    }

    #[test]
    fn test_partial_toml() {
        let config = BeaconConfig::from_toml(
            r#"
            [discovery]
            port = 9000
            mode = "subnet"

            [heartbeat]
            failure_ceiling = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.discovery.port, 9000);
        assert_eq!(config.discovery.mode, ResolveMode::Subnet);
        assert_eq!(config.heartbeat.ceiling(), None);
        assert_eq!(config.heartbeat.interval_ms, DEFAULT_INTERVAL_MS);
        assert_eq!(config.logs.capacity, DEFAULT_LOG_CAPACITY);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = BeaconConfig::default();
        config
            .apply_env(env(&[
                (ENV_DISCOVERY_PORT, "7001"),
                (ENV_DISCOVERY_HOST, "10.0.0.255"),
                (ENV_DISCOVERY_MODE, "Subnet"),
            ]))
            .unwrap();

        assert_eq!(config.discovery.port, 7001);
        assert_eq!(config.discovery.host.as_deref(), Some("10.0.0.255"));
        assert_eq!(config.discovery.mode, ResolveMode::Subnet);
    }

    #[test]
    fn test_empty_env_is_ignored() {
        let mut config = BeaconConfig::default();
        config.apply_env(env(&[(ENV_DISCOVERY_PORT, "")])).unwrap();
        assert_eq!(config.discovery.port, DEFAULT_DISCOVERY_PORT);
    }

    #[test]
    fn test_invalid_port_rejected() {
        let mut config = BeaconConfig::default();
        assert!(config.apply_env(env(&[(ENV_DISCOVERY_PORT, "nope")])).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = BeaconConfig::default();
        config.logs.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = BeaconConfig::default();
        config.heartbeat.max_datagram_size = 70_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let mut config = BeaconConfig::default();
        config.heartbeat.interval_ms = 0;

        assert!(config.validate().is_err());
        assert_eq!(config.heartbeat.interval(), Duration::from_millis(1));
    }
}
