//! Integration port — lifecycle and service-call handling for device integrations.
//!
//! An integration bridges an external protocol into the hub. It sets up its
//! devices once, is polled periodically, handles service calls directed at
//! entities it owns, and releases its devices on teardown.

use std::future::Future;

use gree_amber_domain::device::Device;
use gree_amber_domain::entity::Entity;
use gree_amber_domain::error::HubError;
use gree_amber_domain::event::Event;
use gree_amber_domain::id::{DeviceId, EntityId};

/// Context provided to integrations for persisting what they expose.
///
/// This is a **port** — integrations call it to register devices and
/// entities. The daemon provides an in-memory implementation
/// ([`EntityRegistry`](crate::services::entity_registry::EntityRegistry)).
pub trait IntegrationContext: Send + Sync {
    /// Persist a device (create or replace by id).
    fn upsert_device(&self, device: Device) -> impl Future<Output = Result<Device, HubError>> + Send;

    /// Persist an entity snapshot (create or replace by id).
    ///
    /// Publishes `EntityCreated` / `StateChanged` events when appropriate.
    fn upsert_entity(&self, entity: Entity) -> impl Future<Output = Result<Entity, HubError>> + Send;

    /// Remove a device together with all of its entities.
    fn remove_device(&self, device_id: DeviceId) -> impl Future<Output = Result<(), HubError>> + Send;

    /// Publish a domain event to the event bus.
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), HubError>> + Send;

    /// Convenience: persist a full [`DiscoveredDevice`] (device + all entities).
    fn persist_discovered(
        &self,
        dd: DiscoveredDevice,
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        async move {
            self.upsert_device(dd.device).await?;
            for entity in dd.entities {
                self.upsert_entity(entity).await?;
            }
            Ok(())
        }
    }
}

/// A pluggable device integration.
///
/// The daemon calls the lifecycle methods in order:
///
/// 1. [`setup`](Self::setup) — connect every device and register its entities
/// 2. [`refresh`](Self::refresh) — on every poll tick
/// 3. [`handle_service_call`](Self::handle_service_call) — whenever a user acts
/// 4. [`teardown`](Self::teardown) — release every device
pub trait Integration {
    /// Unique name identifying this integration (e.g. `"gree"`).
    fn name(&self) -> &'static str;

    /// Connect every configured device and persist its device and entities.
    ///
    /// Either every configured device comes up, or nothing is registered and
    /// a setup error is returned.
    fn setup(
        &mut self,
        ctx: &impl IntegrationContext,
    ) -> impl Future<Output = Result<(), HubError>> + Send;

    /// Poll every device and persist the refreshed entities.
    fn refresh(&self, ctx: &impl IntegrationContext)
    -> impl Future<Output = Result<(), HubError>> + Send;

    /// Handle a service call (e.g. `set_temperature`, `turn_on`) for an
    /// entity owned by this integration.
    ///
    /// Returns the new [`Entity`] snapshot after handling the call.
    fn handle_service_call(
        &self,
        ctx: &impl IntegrationContext,
        entity_id: EntityId,
        service: &str,
        data: serde_json::Value,
    ) -> impl Future<Output = Result<Entity, HubError>> + Send;

    /// Whether this integration owns the given entity.
    fn owns_entity(&self, entity_id: EntityId) -> bool;

    /// Release devices and remove what was registered.
    fn teardown(
        &mut self,
        ctx: &impl IntegrationContext,
    ) -> impl Future<Output = Result<(), HubError>> + Send;
}

/// A device and its associated entities, ready to persist.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub device: Device,
    pub entities: Vec<Entity>,
}
