//! One set-up unit: its hub device record, coordinator and entities.

use gree_amber_app::ports::{ClimateClient, DeviceIdentity, DiscoveredDevice};
use gree_amber_app::services::climate_entity::{ClimateCall, ClimateEntity};
use gree_amber_app::services::coordinator::DeviceCoordinator;
use gree_amber_app::services::switch_entity::{SwitchEntity, SwitchKind};
use gree_amber_domain::climate::{DeviceCommand, DeviceStatus};
use gree_amber_domain::device::Device;
use gree_amber_domain::device_config::DeviceConfig;
use gree_amber_domain::entity::Entity;
use gree_amber_domain::error::{HubError, NotFoundError};
use gree_amber_domain::id::EntityId;

use crate::INTEGRATION;

const MANUFACTURER: &str = "Gree";

/// Hub record for the unit behind `identity`; the MAC is its unique id.
///
/// # Errors
///
/// Returns a validation error when the identity carries no MAC or name.
pub fn device_record(identity: &DeviceIdentity) -> Result<Device, HubError> {
    Device::builder()
        .name(&identity.name)
        .manufacturer(MANUFACTURER)
        .sw_version(identity.firmware.clone())
        .integration(INTEGRATION)
        .unique_id(&identity.mac)
        .build()
}

pub(crate) struct Unit<C> {
    device: Device,
    host: String,
    port: u16,
    coordinator: DeviceCoordinator<C>,
    climate: ClimateEntity,
    switches: Vec<SwitchEntity>,
}

impl<C: ClimateClient> Unit<C> {
    /// A unit reached through `config`'s address.
    pub(crate) fn new(
        device: Device,
        coordinator: DeviceCoordinator<C>,
        config: &DeviceConfig,
    ) -> Self {
        let slug = coordinator.identity().mac.clone();
        let climate = ClimateEntity::new(device.id, &slug, &device.name);
        let switches = SwitchKind::ALL
            .iter()
            .map(|kind| SwitchEntity::new(device.id, &slug, &device.name, *kind))
            .collect();
        Self {
            device,
            host: config.host.clone(),
            port: config.port,
            coordinator,
            climate,
            switches,
        }
    }

    pub(crate) fn device(&self) -> &Device {
        &self.device
    }

    pub(crate) fn coordinator(&self) -> &DeviceCoordinator<C> {
        &self.coordinator
    }

    pub(crate) fn mac(&self) -> &str {
        &self.coordinator.identity().mac
    }

    pub(crate) fn name(&self) -> &str {
        self.coordinator.name()
    }

    pub(crate) fn is_at(&self, host: &str, port: u16) -> bool {
        self.host == host && self.port == port
    }

    /// Move the unit's client to `host:port` and read it there. The new
    /// address is kept only when the unit answers.
    pub(crate) async fn relocate(&mut self, host: &str, port: u16) -> Result<(), HubError> {
        self.coordinator.relocate(host, port).await?;
        self.host = host.to_string();
        self.port = port;
        Ok(())
    }

    /// Current snapshot of every entity of the unit, climate first.
    pub(crate) fn entities(&self) -> Result<Vec<Entity>, HubError> {
        let status = self.coordinator.status();
        let available = self.coordinator.is_available();
        let mut entities = Vec::with_capacity(1 + self.switches.len());
        entities.push(self.climate.render(&status, available)?);
        for switch in &self.switches {
            entities.push(switch.render(&status, available)?);
        }
        Ok(entities)
    }

    pub(crate) fn discovered(&self) -> Result<DiscoveredDevice, HubError> {
        Ok(DiscoveredDevice {
            device: self.device.clone(),
            entities: self.entities()?,
        })
    }

    pub(crate) fn owns(&self, entity_id: EntityId) -> bool {
        self.climate.id() == entity_id || self.switches.iter().any(|s| s.id() == entity_id)
    }

    /// Translate a service call on one of this unit's entities.
    pub(crate) fn commands_for(
        &self,
        entity_id: EntityId,
        service: &str,
        data: serde_json::Value,
    ) -> Result<Vec<DeviceCommand>, HubError> {
        let status: DeviceStatus = self.coordinator.status();
        if self.climate.id() == entity_id {
            let call = ClimateCall::parse(service, data)?;
            return self.climate.commands(call, &status);
        }
        self.switches
            .iter()
            .find(|switch| switch.id() == entity_id)
            .ok_or_else(|| {
                HubError::from(NotFoundError {
                    entity: "Entity",
                    id: entity_id.to_string(),
                })
            })?
            .commands(service, &status)
    }
}
