//! Driver configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounds for every completion and state poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Pause between polls in milliseconds
    pub interval_ms: u64,
    /// Polls before giving up with a timeout
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 200,
            max_attempts: 150,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Longest a poll loop can wait, ignoring I/O time
    pub fn deadline(&self) -> Duration {
        self.interval() * self.max_attempts
    }
}

/// Connection settings for one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// VISA-style resource string (see [`SessionAddress`](crate::SessionAddress))
    pub address: String,
    /// I/O timeout for each write or read, in milliseconds
    pub timeout_ms: u64,
    /// Power ceiling in dBm; lowers the model limit, never raises it
    pub max_power_dbm: Option<f64>,
    /// Send `*CLS` and `*RST` after identifying the device
    pub reset_on_connect: bool,
    /// Completion poll bounds
    pub poll: PollConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            address: "SIM::SMBV100A".to_string(),
            timeout_ms: 10_000,
            max_power_dbm: None,
            reset_on_connect: true,
            poll: PollConfig::default(),
        }
    }
}

impl DriverConfig {
    /// Default settings for the given address
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DriverConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert!(config.reset_on_connect);
        assert_eq!(config.poll.interval(), Duration::from_millis(200));
        assert_eq!(config.poll.deadline(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DriverConfig = serde_json::from_str(
            r#"{"address": "TCPIP0::10.0.0.7::5025::SOCKET", "poll": {"interval_ms": 50}}"#,
        )
        .unwrap();

        assert_eq!(config.address, "TCPIP0::10.0.0.7::5025::SOCKET");
        assert_eq!(config.timeout_ms, 10_000);
        assert_eq!(config.max_power_dbm, None);
        assert_eq!(config.poll.interval_ms, 50);
        assert_eq!(config.poll.max_attempts, 150);
    }
}
