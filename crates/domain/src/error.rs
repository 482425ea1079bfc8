//! Common error types used across the workspace.
//!
//! Every layer defines its own typed errors and converts them into
//! [`HubError`] via `#[from]` (or an explicit conversion) when crossing a
//! port boundary.

use std::error::Error as StdError;

/// Boxed error source carried across layer boundaries.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Top-level error returned by domain logic, services, and integrations.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// A domain invariant or user input was rejected.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// The requested record does not exist.
    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// An integration could not be set up (device unreachable or misconfigured).
    #[error("integration setup failed")]
    Setup(#[from] SetupError),

    /// A runtime read or write to a device failed.
    #[error("device communication failed")]
    Command(#[from] CommandError),
}

/// Rejected input or broken invariant.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("entity id must not be empty")]
    EmptyEntityId,

    #[error("integration must not be empty")]
    EmptyIntegration,

    #[error("unique id must not be empty")]
    EmptyUniqueId,

    #[error("host must not be empty")]
    EmptyHost,

    #[error("host {host:?} is not a valid address")]
    InvalidHost { host: String },

    #[error("port must be non-zero")]
    InvalidPort,

    #[error("a device key requires the device MAC address")]
    MissingIdentifier,

    #[error("device key must be 16 bytes, got {actual}")]
    InvalidKeyLength { actual: usize },

    #[error("temperature {value} is outside {min}..={max}")]
    TemperatureOutOfRange { value: i32, min: i32, max: i32 },

    #[error("{id:?} is not a valid identifier")]
    InvalidId { id: String },

    #[error("unknown service {service:?}")]
    UnknownService { service: String },

    #[error("invalid service data")]
    InvalidServiceData(#[source] serde_json::Error),
}

/// Render `err` followed by each of its sources, separated by `": "`.
#[must_use]
pub fn display_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// A lookup by identifier found nothing.
#[derive(Debug, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    /// Kind of record looked up (e.g. `"Entity"`).
    pub entity: &'static str,
    /// The identifier that was looked up.
    pub id: String,
}

/// A device could not be brought up while setting up an integration.
#[derive(Debug, thiserror::Error)]
#[error("device at {host} could not be set up")]
pub struct SetupError {
    /// Host address from the device configuration.
    pub host: String,
    /// Invalid configuration or underlying client failure.
    #[source]
    pub source: BoxError,
}

/// A command or state read sent to a running device failed.
#[derive(Debug, thiserror::Error)]
#[error("communication with {device} failed")]
pub struct CommandError {
    /// Display name of the device.
    pub device: String,
    /// Underlying client failure.
    #[source]
    pub source: BoxError,
}
