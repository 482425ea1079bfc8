//! Climate client port — how the application talks to one air conditioner.
//!
//! A [`ClientFactory`] turns a [`DeviceConfig`] into a connected, bound
//! [`ClimateClient`]. The client reads the unit's [`DeviceStatus`], pushes
//! [`DeviceCommand`]s and is closed exactly once when its entities go away.

use std::future::Future;

use gree_amber_domain::climate::{DeviceCommand, DeviceStatus};
use gree_amber_domain::device_config::DeviceConfig;
use gree_amber_domain::error::BoxError;

/// Construction options for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Suppress the unit's audible confirmation beep on every command.
    pub suppress_beep: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            suppress_beep: true,
        }
    }
}

/// What a client learned about the unit while connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Lowercase MAC without separators.
    pub mac: String,
    /// Name reported by the unit (or the configured one).
    pub name: String,
    /// Address the client talks to.
    pub host: String,
    /// Firmware version, once known.
    pub firmware: Option<String>,
}

/// Failure reported by a [`ClimateClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The unit did not answer within the request timeout.
    #[error("device did not respond in time")]
    Timeout,

    /// Binding did not yield a device key.
    #[error("device is not bound")]
    NotBound,

    /// The client was already closed.
    #[error("client is closed")]
    Closed,

    /// Socket, cipher or protocol failure.
    #[error("device transport failure")]
    Transport(#[source] BoxError),
}

/// A connected client for one unit.
pub trait ClimateClient: Send {
    /// Identity of the unit behind this client.
    fn identity(&self) -> DeviceIdentity;

    /// Read the current state of the unit.
    fn update_state(&mut self) -> impl Future<Output = Result<DeviceStatus, ClientError>> + Send;

    /// Send `commands` to the unit in a single request.
    ///
    /// On error the client's own view of the unit is left as it was.
    fn push_state(
        &mut self,
        commands: &[DeviceCommand],
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Talk to the unit at `host:port` from now on, keeping the binding.
    /// Used when a known unit answers a scan from a new address.
    fn relocate(
        &mut self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Release the underlying connection. Further calls fail with
    /// [`ClientError::Closed`].
    fn close(&mut self) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Builds clients from user configuration.
pub trait ClientFactory: Send + Sync {
    /// Concrete client type produced.
    type Client: ClimateClient + 'static;

    /// Reach the unit described by `config`, identify and bind it.
    fn connect(
        &self,
        config: &DeviceConfig,
        options: ClientOptions,
    ) -> impl Future<Output = Result<Self::Client, ClientError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_suppress_beep_by_default() {
        assert!(ClientOptions::default().suppress_beep);
    }

    #[test]
    fn should_display_closed_error() {
        assert_eq!(ClientError::Closed.to_string(), "client is closed");
    }
}
