//! Application services — use-case implementations.
//!
//! Each service accepts port trait implementations via generic parameters
//! (constructor injection), keeping this layer decoupled from concrete adapters.

pub mod climate_entity;
pub mod coordinator;
pub mod entity_registry;
pub mod switch_entity;
