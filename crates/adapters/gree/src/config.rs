//! Gree integration configuration.

use std::time::Duration;

use serde::Deserialize;

use gree_amber_domain::device_config::DeviceConfig;

use crate::client::Timeouts;

/// Configuration for the Gree integration (`[gree]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GreeConfig {
    /// Interval between status polls, in seconds.
    pub update_interval_secs: u64,
    /// Timeout for status, command and identify requests, in seconds.
    pub timeout_secs: u64,
    /// Timeout for each bind attempt, in seconds.
    pub bind_timeout_secs: u64,
    /// Consecutive missed polls before entities turn unavailable.
    pub max_errors: u32,
    /// Delay before retrying a failed setup, in seconds.
    pub setup_retry_secs: u64,
    /// Silence after which even a successful poll counts as missed, in
    /// seconds.
    pub max_response_age_secs: u64,
    /// LAN broadcast discovery.
    pub discovery: DiscoveryConfig,
    /// Configured units (`[[gree.devices]]`).
    pub devices: Vec<DeviceConfig>,
}

impl Default for GreeConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 60,
            timeout_secs: 10,
            bind_timeout_secs: 10,
            max_errors: 2,
            setup_retry_secs: 30,
            max_response_age_secs: 600,
            discovery: DiscoveryConfig::default(),
            devices: Vec::new(),
        }
    }
}

impl GreeConfig {
    /// Poll interval, at least one second.
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs.max(1))
    }

    /// Setup retry delay, at least one second.
    #[must_use]
    pub fn setup_retry(&self) -> Duration {
        Duration::from_secs(self.setup_retry_secs.max(1))
    }

    #[must_use]
    pub fn max_response_age(&self) -> Duration {
        Duration::from_secs(self.max_response_age_secs)
    }

    #[must_use]
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            request: Duration::from_secs(self.timeout_secs.max(1)),
            bind: Duration::from_secs(self.bind_timeout_secs.max(1)),
        }
    }
}

/// Configuration for broadcast discovery (`[gree.discovery]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    /// How long to collect scan replies, in seconds.
    pub timeout_secs: u64,
    /// Interval between rescans once set up, in seconds.
    pub scan_interval_secs: u64,
    /// Broadcast addresses, optionally with a port (`192.168.1.255`,
    /// `10.0.0.255:7000`).
    pub broadcast: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: 10,
            scan_interval_secs: 300,
            broadcast: vec!["255.255.255.255".to_string()],
        }
    }
}

impl DiscoveryConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Rescan interval, at least one second.
    #[must_use]
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs.max(1))
    }
}
