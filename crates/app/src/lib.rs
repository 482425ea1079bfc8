//! # gree-amber-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters implement:
//!   - `ClimateClient` / `ClientFactory` — talk to one air conditioner
//!   - `Integration` / `IntegrationContext` — integration lifecycle and the
//!     hub-side store it persists into
//!   - `EventPublisher` — publish domain events
//! - Provide the use-cases every climate integration shares:
//!   - `DeviceCoordinator` — owns a client, polls it, pushes commands, closes it
//!   - `ClimateEntity` / `SwitchEntity` — map a `DeviceStatus` to entities and
//!     service calls to `DeviceCommand`s
//!   - `EntityRegistry` — in-memory `IntegrationContext` used by the daemon
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `gree-amber-domain` only (plus `tokio::sync` for locks and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod event_bus;
pub mod ports;
pub mod services;
