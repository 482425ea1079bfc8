//! # gree-amber-domain
//!
//! Pure domain model for the gree-amber hub.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Devices** (air conditioners found on the LAN) and their
//!   **Entities** (the climate control and its auxiliary switches)
//! - Define the **device configuration** a user supplies at setup time
//! - Define the **climate value objects**: the mirrored [`climate::DeviceStatus`]
//!   and the [`climate::DeviceCommand`]s written to a unit
//! - Define **Events** (state-change and failure records)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod climate;
pub mod device;
pub mod device_config;
pub mod entity;
pub mod event;
