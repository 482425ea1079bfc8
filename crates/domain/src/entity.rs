//! Entity — the central state-holding concept of the hub.
//!
//! An entity represents a single observable/controllable aspect of a device
//! (an air conditioner's climate control, its panel light switch, …).

mod attribute_value;
mod state;

pub use attribute_value::AttributeValue;
pub use state::EntityState;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, ValidationError};
use crate::id::{DeviceId, EntityId};
use crate::time::{Timestamp, now};

/// A state holder owned by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub device_id: DeviceId,
    /// Human-readable address such as `climate.gree_f4911e7aca59`.
    pub entity_id: String,
    pub friendly_name: String,
    pub state: EntityState,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub last_changed: Timestamp,
    pub last_updated: Timestamp,
}

impl Entity {
    /// Create a builder for constructing an [`Entity`].
    #[must_use]
    pub fn builder() -> EntityBuilder {
        EntityBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] when `entity_id` or `friendly_name`
    /// is empty.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.entity_id.is_empty() {
            return Err(ValidationError::EmptyEntityId.into());
        }
        if self.friendly_name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        Ok(())
    }

    /// The domain part of `entity_id` (`climate`, `switch`, …).
    #[must_use]
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map_or(self.entity_id.as_str(), |(domain, _)| domain)
    }

    /// Replace the state, bumping `last_changed` only when it differs.
    pub fn update_state(&mut self, state: EntityState, at: Timestamp) {
        if self.state != state {
            self.state = state;
            self.last_changed = at;
        }
        self.last_updated = at;
    }

    /// Look up an attribute by key.
    #[must_use]
    pub fn get_attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Insert or replace an attribute.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.attributes.insert(key.into(), value);
    }

    /// Whether `other` carries a different state or attribute set.
    #[must_use]
    pub fn differs_from(&self, other: &Self) -> bool {
        self.state != other.state || self.attributes != other.attributes
    }
}

/// Step-by-step builder for [`Entity`].
#[derive(Debug, Default)]
pub struct EntityBuilder {
    id: Option<EntityId>,
    device_id: Option<DeviceId>,
    entity_id: Option<String>,
    friendly_name: Option<String>,
    state: EntityState,
    attributes: BTreeMap<String, AttributeValue>,
}

impl EntityBuilder {
    #[must_use]
    pub fn id(mut self, id: EntityId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn device_id(mut self, device_id: DeviceId) -> Self {
        self.device_id = Some(device_id);
        self
    }

    #[must_use]
    pub fn entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    #[must_use]
    pub fn friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn state(mut self, state: EntityState) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Consume the builder, validate, and return an [`Entity`].
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] if `entity_id` or `friendly_name`
    /// is missing or empty.
    pub fn build(self) -> Result<Entity, HubError> {
        let ts = now();
        let entity = Entity {
            id: self.id.unwrap_or_default(),
            device_id: self.device_id.unwrap_or_default(),
            entity_id: self.entity_id.unwrap_or_default(),
            friendly_name: self.friendly_name.unwrap_or_default(),
            state: self.state,
            attributes: self.attributes,
            last_changed: ts,
            last_updated: ts,
        };
        entity.validate()?;
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity() -> Entity {
        Entity::builder()
            .entity_id("climate.gree_f4911e7aca59")
            .friendly_name("Bedroom AC")
            .state(EntityState::Off)
            .build()
            .unwrap()
    }

    #[test]
    fn should_reject_empty_entity_id() {
        let result = Entity::builder().friendly_name("AC").build();
        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::EmptyEntityId))
        ));
    }

    #[test]
    fn should_extract_domain_from_entity_id() {
        assert_eq!(entity().domain(), "climate");
    }

    #[test]
    fn should_bump_last_changed_only_on_state_change() {
        let mut entity = entity();
        let first_change = entity.last_changed;

        let later = first_change + chrono::Duration::seconds(5);
        entity.update_state(EntityState::Off, later);
        assert_eq!(entity.last_changed, first_change);
        assert_eq!(entity.last_updated, later);

        let even_later = later + chrono::Duration::seconds(5);
        entity.update_state(EntityState::On, even_later);
        assert_eq!(entity.last_changed, even_later);
    }

    #[test]
    fn should_detect_attribute_difference() {
        let a = entity();
        let mut b = a.clone();
        assert!(!a.differs_from(&b));
        b.set_attribute("temperature", AttributeValue::Int(24));
        assert!(a.differs_from(&b));
    }

    #[test]
    fn should_read_attribute_set_by_builder() {
        let entity = Entity::builder()
            .entity_id("switch.gree_panel_light")
            .friendly_name("Panel light")
            .attribute("enabled_by_default", AttributeValue::Bool(true))
            .build()
            .unwrap();
        assert_eq!(
            entity.get_attribute("enabled_by_default"),
            Some(&AttributeValue::Bool(true))
        );
    }
}
