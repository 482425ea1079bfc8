//! Auxiliary on/off features of a unit exposed as `switch.*` entities.

use gree_amber_domain::climate::{DeviceCommand, DeviceStatus};
use gree_amber_domain::entity::{AttributeValue, Entity, EntityState};
use gree_amber_domain::error::{HubError, ValidationError};
use gree_amber_domain::id::{DeviceId, EntityId};

/// Which feature a switch controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchKind {
    PanelLight,
    FreshAir,
    XFan,
    /// Ionizer ("health" mode).
    Health,
}

impl SwitchKind {
    pub const ALL: [Self; 4] = [Self::PanelLight, Self::FreshAir, Self::XFan, Self::Health];

    /// Suffix of the `entity_id`.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::PanelLight => "panel_light",
            Self::FreshAir => "fresh_air",
            Self::XFan => "xfan",
            Self::Health => "health",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::PanelLight => "Panel Light",
            Self::FreshAir => "Fresh Air",
            Self::XFan => "XFan",
            Self::Health => "Health mode",
        }
    }

    #[must_use]
    pub fn enabled_by_default(self) -> bool {
        !matches!(self, Self::Health)
    }

    #[must_use]
    pub fn is_on(self, status: &DeviceStatus) -> bool {
        match self {
            Self::PanelLight => status.light,
            Self::FreshAir => status.fresh_air,
            Self::XFan => status.xfan,
            Self::Health => status.anion,
        }
    }

    #[must_use]
    pub fn command(self, on: bool) -> DeviceCommand {
        match self {
            Self::PanelLight => DeviceCommand::Light(on),
            Self::FreshAir => DeviceCommand::FreshAir(on),
            Self::XFan => DeviceCommand::XFan(on),
            Self::Health => DeviceCommand::Anion(on),
        }
    }
}

/// One `switch.*` entity bound to a device feature.
#[derive(Debug, Clone)]
pub struct SwitchEntity {
    id: EntityId,
    device_id: DeviceId,
    kind: SwitchKind,
    entity_id: String,
    friendly_name: String,
}

impl SwitchEntity {
    #[must_use]
    pub fn new(device_id: DeviceId, slug: &str, device_name: &str, kind: SwitchKind) -> Self {
        Self {
            id: EntityId::new(),
            device_id,
            kind,
            entity_id: format!("switch.gree_{slug}_{}", kind.key()),
            friendly_name: format!("{device_name} {}", kind.label()),
        }
    }

    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> SwitchKind {
        self.kind
    }

    /// Snapshot the switch for `status`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the builder fails.
    pub fn render(&self, status: &DeviceStatus, available: bool) -> Result<Entity, HubError> {
        let state = if available {
            EntityState::from_flag(self.kind.is_on(status))
        } else {
            EntityState::Unavailable
        };
        Entity::builder()
            .id(self.id)
            .device_id(self.device_id)
            .entity_id(&self.entity_id)
            .friendly_name(&self.friendly_name)
            .state(state)
            .attribute(
                "enabled_by_default",
                AttributeValue::Bool(self.kind.enabled_by_default()),
            )
            .build()
    }

    /// Commands for `turn_on`, `turn_off` or `toggle`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownService`] for any other service.
    pub fn commands(
        &self,
        service: &str,
        status: &DeviceStatus,
    ) -> Result<Vec<DeviceCommand>, HubError> {
        let on = match service {
            "turn_on" => true,
            "turn_off" => false,
            "toggle" => !self.kind.is_on(status),
            other => {
                return Err(ValidationError::UnknownService {
                    service: other.to_string(),
                }
                .into());
            }
        };
        Ok(vec![self.kind.command(on)])
    }
}
