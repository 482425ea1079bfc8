//! Device configuration — what a user supplies to set up one air conditioner.

use serde::{Deserialize, Serialize};

use crate::error::{HubError, ValidationError};

/// Default UDP port Gree units listen on.
pub const DEFAULT_PORT: u16 = 7000;

/// Length of a Gree device key, in bytes.
pub const DEVICE_KEY_LEN: usize = 16;

/// Encryption scheme a unit speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionVersion {
    /// AES-128-ECB, used by most firmware.
    #[default]
    V1,
    /// AES-128-GCM, used by newer firmware.
    V2,
}

/// Configuration for a single unit, immutable for the lifetime of its entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// IP address or hostname of the unit.
    pub host: String,
    /// UDP port, almost always 7000.
    #[serde(default = "default_port")]
    pub port: u16,
    /// MAC address identifying the unit. Learned from the unit when absent.
    #[serde(default)]
    pub mac: Option<String>,
    /// Previously negotiated device key. Skips the bind handshake when set.
    #[serde(default)]
    pub key: Option<String>,
    /// Cipher to use together with `key`.
    #[serde(default)]
    pub encryption: Option<EncryptionVersion>,
    /// Display name; the unit's own name is used when absent.
    #[serde(default)]
    pub name: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl DeviceConfig {
    /// Minimal configuration for a host with every optional field unset.
    #[must_use]
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            mac: None,
            key: None,
            encryption: None,
            name: None,
        }
    }

    /// Check that the fields needed to reach and identify the unit are present.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] when the host is empty or malformed,
    /// the port is zero, a key is given without a MAC, the key is not
    /// [`DEVICE_KEY_LEN`] bytes, or the name is empty.
    pub fn validate(&self) -> Result<(), HubError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(ValidationError::EmptyHost.into());
        }
        if host.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidHost {
                host: self.host.clone(),
            }
            .into());
        }
        if self.port == 0 {
            return Err(ValidationError::InvalidPort.into());
        }
        if let Some(key) = &self.key {
            if self.normalized_mac().is_none() {
                return Err(ValidationError::MissingIdentifier.into());
            }
            if key.len() != DEVICE_KEY_LEN {
                return Err(ValidationError::InvalidKeyLength { actual: key.len() }.into());
            }
        }
        if self.name.as_ref().is_some_and(|name| name.trim().is_empty()) {
            return Err(ValidationError::EmptyName.into());
        }
        Ok(())
    }

    /// The MAC in the lowercase, separator-free form units report (`f4911e7aca59`).
    #[must_use]
    pub fn normalized_mac(&self) -> Option<String> {
        self.mac
            .as_deref()
            .map(|mac| {
                mac.chars()
                    .filter(char::is_ascii_hexdigit)
                    .collect::<String>()
                    .to_ascii_lowercase()
            })
            .filter(|mac| !mac.is_empty())
    }
}
