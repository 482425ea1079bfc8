//! In-memory registry of devices and entities.
//!
//! Implements [`IntegrationContext`] for integrations and offers read access
//! for the HTTP surface. Change events go out through an [`EventPublisher`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::json;

use gree_amber_domain::device::Device;
use gree_amber_domain::entity::Entity;
use gree_amber_domain::error::{HubError, NotFoundError};
use gree_amber_domain::event::{Event, EventType};
use gree_amber_domain::id::{DeviceId, EntityId};
use gree_amber_domain::time::now;

use crate::ports::{EventPublisher, IntegrationContext};

#[derive(Default)]
struct Tables {
    devices: HashMap<DeviceId, Device>,
    entities: HashMap<EntityId, Entity>,
}

/// Shared, cloneable store of everything integrations registered.
pub struct EntityRegistry<EP> {
    tables: Arc<RwLock<Tables>>,
    publisher: EP,
}

impl<EP: Clone> Clone for EntityRegistry<EP> {
    fn clone(&self) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
            publisher: self.publisher.clone(),
        }
    }
}

impl<EP> EntityRegistry<EP> {
    /// Create an empty registry publishing through `publisher`.
    pub fn new(publisher: EP) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            publisher,
        }
    }

    /// All entities, sorted by `entity_id`.
    #[must_use]
    pub fn list_entities(&self) -> Vec<Entity> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut entities: Vec<Entity> = tables.entities.values().cloned().collect();
        entities.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        entities
    }

    /// Look up an entity by id.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] when no entity with `id` is registered.
    pub fn get_entity(&self, id: EntityId) -> Result<Entity, HubError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.entities.get(&id).cloned().ok_or_else(|| {
            NotFoundError {
                entity: "Entity",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// All devices, sorted by name.
    #[must_use]
    pub fn list_devices(&self) -> Vec<Device> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut devices: Vec<Device> = tables.devices.values().cloned().collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        devices
    }
}

impl<EP> IntegrationContext for EntityRegistry<EP>
where
    EP: EventPublisher + Send + Sync + 'static,
{
    async fn upsert_device(&self, device: Device) -> Result<Device, HubError> {
        device.validate()?;
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.devices.insert(device.id, device.clone());
        Ok(device)
    }

    async fn upsert_entity(&self, mut entity: Entity) -> Result<Entity, HubError> {
        entity.validate()?;
        let event = {
            let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
            let event = match tables.entities.get(&entity.id) {
                None => Some(Event::new(
                    EventType::EntityCreated,
                    Some(entity.id),
                    json!({ "entity_id": entity.entity_id, "state": entity.state }),
                )),
                Some(previous) => {
                    let at = now();
                    let changed = previous.differs_from(&entity);
                    let old_state = previous.state;
                    let new_state = entity.state;
                    entity.last_changed = previous.last_changed;
                    entity.state = old_state;
                    entity.update_state(new_state, at);
                    changed.then(|| {
                        Event::new(
                            EventType::StateChanged,
                            Some(entity.id),
                            json!({
                                "entity_id": entity.entity_id,
                                "old_state": old_state,
                                "new_state": new_state,
                            }),
                        )
                    })
                }
            };
            tables.entities.insert(entity.id, entity.clone());
            event
        };
        if let Some(event) = event {
            self.publisher.publish(event).await?;
        }
        Ok(entity)
    }

    async fn remove_device(&self, device_id: DeviceId) -> Result<(), HubError> {
        let removed: Vec<Entity> = {
            let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
            tables.devices.remove(&device_id);
            let ids: Vec<EntityId> = tables
                .entities
                .values()
                .filter(|entity| entity.device_id == device_id)
                .map(|entity| entity.id)
                .collect();
            ids.iter()
                .filter_map(|id| tables.entities.remove(id))
                .collect()
        };
        for entity in removed {
            self.publisher
                .publish(Event::new(
                    EventType::EntityRemoved,
                    Some(entity.id),
                    json!({ "entity_id": entity.entity_id }),
                ))
                .await?;
        }
        Ok(())
    }

    async fn publish(&self, event: Event) -> Result<(), HubError> {
        self.publisher.publish(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::InProcessEventBus;
    use gree_amber_domain::entity::{AttributeValue, EntityState};
    use gree_amber_domain::error::ValidationError;

    fn registry() -> (EntityRegistry<InProcessEventBus>, InProcessEventBus) {
        let bus = InProcessEventBus::default();
        (EntityRegistry::new(bus.clone()), bus)
    }

    fn device() -> Device {
        Device::builder()
            .name("Bedroom AC")
            .integration("gree")
            .unique_id("f4911e7aca59")
            .build()
            .unwrap()
    }

    fn entity(device_id: DeviceId, entity_id: &str, state: EntityState) -> Entity {
        Entity::builder()
            .device_id(device_id)
            .entity_id(entity_id)
            .friendly_name("Bedroom AC")
            .state(state)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_publish_created_then_changed() {
        let (registry, bus) = registry();
        let mut rx = bus.subscribe();
        let device = registry.upsert_device(device()).await.unwrap();
        let first = entity(device.id, "climate.gree_f4911e7aca59", EntityState::Off);
        registry.upsert_entity(first.clone()).await.unwrap();

        let mut second = first.clone();
        second.state = EntityState::On;
        registry.upsert_entity(second).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().event_type, EventType::EntityCreated);
        let changed = rx.recv().await.unwrap();
        assert_eq!(changed.event_type, EventType::StateChanged);
        assert_eq!(changed.data["new_state"], "on");
    }

    #[tokio::test]
    async fn should_not_publish_when_nothing_changed() {
        let (registry, bus) = registry();
        let device = registry.upsert_device(device()).await.unwrap();
        let first = entity(device.id, "climate.gree_f4911e7aca59", EntityState::Off);
        registry.upsert_entity(first.clone()).await.unwrap();

        let mut rx = bus.subscribe();
        registry.upsert_entity(first).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn should_keep_last_changed_when_only_attributes_change() {
        let (registry, _bus) = registry();
        let device = registry.upsert_device(device()).await.unwrap();
        let first = entity(device.id, "climate.gree_f4911e7aca59", EntityState::On);
        let stored = registry.upsert_entity(first.clone()).await.unwrap();

        let mut second = entity(device.id, "climate.gree_f4911e7aca59", EntityState::On);
        second.id = first.id;
        second.set_attribute("temperature", AttributeValue::Int(22));
        let updated = registry.upsert_entity(second).await.unwrap();

        assert_eq!(updated.last_changed, stored.last_changed);
        assert_eq!(
            registry.get_entity(first.id).unwrap().get_attribute("temperature"),
            Some(&AttributeValue::Int(22))
        );
    }

    #[tokio::test]
    async fn should_remove_device_entities() {
        let (registry, bus) = registry();
        let device = registry.upsert_device(device()).await.unwrap();
        registry
            .upsert_entity(entity(device.id, "climate.gree_f4911e7aca59", EntityState::On))
            .await
            .unwrap();
        registry
            .upsert_entity(entity(
                device.id,
                "switch.gree_f4911e7aca59_panel_light",
                EntityState::On,
            ))
            .await
            .unwrap();

        let mut rx = bus.subscribe();
        registry.remove_device(device.id).await.unwrap();

        assert!(registry.list_entities().is_empty());
        assert!(registry.list_devices().is_empty());
        assert_eq!(rx.recv().await.unwrap().event_type, EventType::EntityRemoved);
        assert_eq!(rx.recv().await.unwrap().event_type, EventType::EntityRemoved);
    }

    #[tokio::test]
    async fn should_return_not_found_for_unknown_entity() {
        let (registry, _bus) = registry();
        let result = registry.get_entity(EntityId::new());
        assert!(matches!(result, Err(HubError::NotFound(_))));
    }

    #[tokio::test]
    async fn should_reject_invalid_entity() {
        let (registry, _bus) = registry();
        let mut invalid = entity(DeviceId::new(), "climate.gree_x", EntityState::On);
        invalid.entity_id.clear();
        let result = registry.upsert_entity(invalid).await;
        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::EmptyEntityId))
        ));
    }

    #[tokio::test]
    async fn should_list_entities_sorted() {
        let (registry, _bus) = registry();
        let device = registry.upsert_device(device()).await.unwrap();
        for entity_id in ["switch.gree_a_xfan", "climate.gree_a"] {
            registry
                .upsert_entity(entity(device.id, entity_id, EntityState::Off))
                .await
                .unwrap();
        }
        let ids: Vec<String> = registry
            .list_entities()
            .into_iter()
            .map(|entity| entity.entity_id)
            .collect();
        assert_eq!(ids, vec!["climate.gree_a", "switch.gree_a_xfan"]);
    }
}
