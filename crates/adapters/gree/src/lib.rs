//! # gree-amber-adapter-gree
//!
//! Gree integration: controls Gree air conditioners over their LAN protocol.
//!
//! ## Exposed entities (per unit)
//!
//! | Entity ID | Behaviour |
//! |-----------|-----------|
//! | `climate.gree_{mac}` | Power, HVAC mode, target temperature, fan, swing, preset, quiet |
//! | `switch.gree_{mac}_panel_light` | Display light |
//! | `switch.gree_{mac}_fresh_air` | Fresh air valve |
//! | `switch.gree_{mac}_xfan` | X-Fan (coil drying) |
//! | `switch.gree_{mac}_health` | Anion generator, disabled by default |
//!
//! ## Protocol
//!
//! Units speak JSON over UDP port 7000. Payloads are AES encrypted with a
//! generic key until the unit is bound, then with its own device key
//! ([`cipher`], [`protocol`]). A [`client::GreeClient`] binds one unit, reads
//! its status and writes only the properties that changed ([`props`]).
//! Every client this integration opens suppresses the unit's confirmation beep.
//!
//! With discovery enabled, [`GreeIntegration::rescan`] binds units that show
//! up later and follows known units to a new address.
//!
//! ## Dependency rule
//!
//! Depends on `gree-amber-app` (port traits, coordinator, entity mapping) and
//! `gree-amber-domain`.

pub mod cipher;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod props;
pub mod protocol;
mod unit;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use client::{GreeClient, Timeouts, UdpClientFactory};
pub use config::{DiscoveryConfig, GreeConfig};
pub use error::{CipherError, GreeError};
pub use unit::device_record;

use serde_json::json;

use gree_amber_app::ports::{
    ClientFactory, ClientOptions, ClimateClient, Integration, IntegrationContext,
};
use gree_amber_app::services::coordinator::DeviceCoordinator;
use gree_amber_domain::device_config::DeviceConfig;
use gree_amber_domain::entity::Entity;
use gree_amber_domain::error::{BoxError, HubError, NotFoundError, SetupError, display_chain};
use gree_amber_domain::event::{Event, EventType};
use gree_amber_domain::id::{DeviceId, EntityId};

use unit::Unit;

/// Integration name, also recorded on every device it registers.
pub const INTEGRATION: &str = "gree";

/// The Gree integration. Generic over the client factory so it can run
/// against fake units.
pub struct GreeIntegration<F: ClientFactory = UdpClientFactory> {
    config: GreeConfig,
    factory: F,
    units: Vec<Unit<F::Client>>,
}

impl GreeIntegration<UdpClientFactory> {
    /// Integration talking UDP with the timeouts from `config`.
    #[must_use]
    pub fn new(config: GreeConfig) -> Self {
        let factory = UdpClientFactory::new(config.timeouts());
        Self::with_factory(config, factory)
    }
}

impl<F: ClientFactory> GreeIntegration<F> {
    #[must_use]
    pub fn with_factory(config: GreeConfig, factory: F) -> Self {
        Self {
            config,
            factory,
            units: Vec::new(),
        }
    }

    /// Number of units currently set up.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.units.len()
    }

    /// Connect, bind and read one unit. The client is closed again when the
    /// first read fails.
    #[tracing::instrument(skip_all, fields(host = %config.host))]
    async fn open_unit(&self, config: &DeviceConfig) -> Result<Unit<F::Client>, BoxError> {
        let options = ClientOptions {
            suppress_beep: true,
        };
        let mut client = self.factory.connect(config, options).await?;

        let initial = match client.update_state().await {
            Ok(status) => status,
            Err(err) => {
                if let Err(close_err) = client.close().await {
                    tracing::debug!(error = %close_err, "closing unreachable client failed");
                }
                return Err(err.into());
            }
        };

        let identity = client.identity();
        let device = match device_record(&identity) {
            Ok(device) => device,
            Err(err) => {
                if let Err(close_err) = client.close().await {
                    tracing::debug!(error = %close_err, "closing unidentified client failed");
                }
                return Err(err.into());
            }
        };
        tracing::info!(mac = %identity.mac, name = %identity.name, "device ready");
        let coordinator =
            DeviceCoordinator::new(&identity.name, client, initial, self.config.max_errors)
                .with_max_response_age(self.config.max_response_age());
        Ok(Unit::new(device, coordinator, config))
    }

    /// Add units found on the LAN that are not configured. A unit that
    /// cannot be bound is skipped.
    async fn discover(&self, units: &mut Vec<Unit<F::Client>>) {
        let found = match discovery::scan(&self.config.discovery).await {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(error = %err, "discovery failed");
                return;
            }
        };
        for scanned in found {
            if units.iter().any(|unit| unit.mac() == scanned.mac) {
                continue;
            }
            match self.open_unit(&scanned.to_config()).await {
                Ok(unit) => units.push(unit),
                Err(err) => {
                    tracing::warn!(mac = %scanned.mac, host = %scanned.host, error = %err, "skipping discovered device");
                }
            }
        }
    }

    /// Scan the LAN again. Units not seen before are bound and registered;
    /// known units answering from a new address are followed there. Returns
    /// the number of units added, and does nothing while discovery is
    /// disabled.
    ///
    /// # Errors
    ///
    /// Returns the context error when a new unit or a moved unit's entities
    /// cannot be stored. A new unit that fails to register is closed again.
    #[tracing::instrument(skip_all, fields(devices = self.units.len()))]
    pub async fn rescan(&mut self, ctx: &impl IntegrationContext) -> Result<usize, HubError> {
        if !self.config.discovery.enabled {
            return Ok(0);
        }
        let found = match discovery::scan(&self.config.discovery).await {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(error = %err, "rescan failed");
                return Ok(0);
            }
        };

        let mut fresh = Vec::new();
        for scanned in found {
            let Some(unit) = self.units.iter_mut().find(|unit| unit.mac() == scanned.mac) else {
                fresh.push(scanned);
                continue;
            };
            if unit.is_at(&scanned.host, scanned.port) {
                continue;
            }
            tracing::info!(mac = %scanned.mac, host = %scanned.host, port = scanned.port, "device changed address");
            match unit.relocate(&scanned.host, scanned.port).await {
                Ok(()) => {
                    for entity in unit.entities()? {
                        ctx.upsert_entity(entity).await?;
                    }
                }
                Err(err) => {
                    tracing::warn!(device = %unit.name(), error = %err, "moved device did not answer");
                }
            }
        }

        let mut added = 0;
        for scanned in fresh {
            let unit = match self.open_unit(&scanned.to_config()).await {
                Ok(unit) => unit,
                Err(err) => {
                    tracing::warn!(mac = %scanned.mac, host = %scanned.host, error = %err, "skipping discovered device");
                    continue;
                }
            };
            let result = match unit.discovered() {
                Ok(discovered) => ctx.persist_discovered(discovered).await,
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                forget(ctx, vec![unit.device().id]).await;
                close_all(vec![unit]).await;
                return Err(err);
            }
            self.units.push(unit);
            added += 1;
        }
        if added > 0 {
            tracing::info!(added, "new gree devices set up");
        }
        Ok(added)
    }

    fn unit_for(&self, entity_id: EntityId) -> Result<&Unit<F::Client>, HubError> {
        self.units
            .iter()
            .find(|unit| unit.owns(entity_id))
            .ok_or_else(|| {
                NotFoundError {
                    entity: "Entity",
                    id: entity_id.to_string(),
                }
                .into()
            })
    }
}

async fn close_all<C: ClimateClient>(units: Vec<Unit<C>>) {
    for unit in units {
        if let Err(err) = unit.coordinator().shutdown().await {
            tracing::warn!(device = %unit.name(), error = %err, "closing client failed");
        }
    }
}

async fn forget(ctx: &impl IntegrationContext, devices: Vec<DeviceId>) {
    for device_id in devices {
        if let Err(err) = ctx.remove_device(device_id).await {
            tracing::warn!(%device_id, error = %err, "removing device failed");
        }
    }
}

impl<F: ClientFactory> Integration for GreeIntegration<F> {
    fn name(&self) -> &'static str {
        INTEGRATION
    }

    #[tracing::instrument(skip_all, fields(devices = self.config.devices.len()))]
    async fn setup(&mut self, ctx: &impl IntegrationContext) -> Result<(), HubError> {
        if !self.units.is_empty() {
            tracing::debug!("already set up");
            return Ok(());
        }
        for config in &self.config.devices {
            config.validate().map_err(|err| SetupError {
                host: config.host.clone(),
                source: err.into(),
            })?;
        }

        let mut units = Vec::with_capacity(self.config.devices.len());
        for config in &self.config.devices {
            match self.open_unit(config).await {
                Ok(unit) => units.push(unit),
                Err(source) => {
                    tracing::warn!(host = %config.host, error = %source, "device not ready");
                    close_all(units).await;
                    return Err(SetupError {
                        host: config.host.clone(),
                        source,
                    }
                    .into());
                }
            }
        }

        if self.config.discovery.enabled {
            self.discover(&mut units).await;
        }

        let mut persisted = Vec::with_capacity(units.len());
        for unit in &units {
            let result = match unit.discovered() {
                Ok(discovered) => ctx.persist_discovered(discovered).await,
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                persisted.push(unit.device().id);
                forget(ctx, persisted).await;
                close_all(units).await;
                return Err(err);
            }
            persisted.push(unit.device().id);
        }

        tracing::info!(count = units.len(), "gree devices set up");
        self.units = units;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn refresh(&self, ctx: &impl IntegrationContext) -> Result<(), HubError> {
        for unit in &self.units {
            if let Err(err) = unit.coordinator().refresh().await {
                tracing::debug!(
                    device = %unit.name(),
                    last_response = %unit.coordinator().last_response(),
                    error = %err,
                    "poll failed"
                );
            }
            for entity in unit.entities()? {
                ctx.upsert_entity(entity).await?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, ctx, data))]
    async fn handle_service_call(
        &self,
        ctx: &impl IntegrationContext,
        entity_id: EntityId,
        service: &str,
        data: serde_json::Value,
    ) -> Result<Entity, HubError> {
        let unit = self.unit_for(entity_id)?;
        let commands = unit.commands_for(entity_id, service, data)?;

        if let Err(err) = unit.coordinator().push(&commands).await {
            let event = Event::new(
                EventType::CommandFailed,
                Some(entity_id),
                json!({
                    "service": service,
                    "device": unit.name(),
                    "error": display_chain(&err),
                }),
            );
            if let Err(publish_err) = ctx.publish(event).await {
                tracing::warn!(error = %publish_err, "publishing command failure failed");
            }
            return Err(err);
        }

        let mut updated = None;
        for entity in unit.entities()? {
            let stored = ctx.upsert_entity(entity).await?;
            if stored.id == entity_id {
                updated = Some(stored);
            }
        }
        updated.ok_or_else(|| {
            NotFoundError {
                entity: "Entity",
                id: entity_id.to_string(),
            }
            .into()
        })
    }

    fn owns_entity(&self, entity_id: EntityId) -> bool {
        self.units.iter().any(|unit| unit.owns(entity_id))
    }

    #[tracing::instrument(skip_all, fields(devices = self.units.len()))]
    async fn teardown(&mut self, ctx: &impl IntegrationContext) -> Result<(), HubError> {
        let units = std::mem::take(&mut self.units);
        let devices: Vec<DeviceId> = units.iter().map(|unit| unit.device().id).collect();
        close_all(units).await;
        for device_id in devices {
            ctx.remove_device(device_id).await?;
        }
        Ok(())
    }
}
