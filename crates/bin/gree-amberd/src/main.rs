//! # gree-amberd — gree-amber daemon
//!
//! Composition root that wires all adapters together and starts the server.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars) and initialise logging
//! - Construct the event bus, the entity registry and the Gree integration
//! - Set the integration up, retrying until every configured unit answers
//! - Poll the units on the configured interval, and rescan the LAN when
//!   discovery is enabled
//! - Build the axum router and serve it
//! - Tear the integration down on shutdown (SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use gree_amber_adapter_gree::GreeIntegration;
use gree_amber_adapter_http_axum::router;
use gree_amber_adapter_http_axum::state::AppState;
use gree_amber_app::event_bus::InProcessEventBus;
use gree_amber_app::ports::Integration;
use gree_amber_app::services::entity_registry::EntityRegistry;
use gree_amber_domain::error::display_chain;
use gree_amber_domain::event::{Event, EventType};

use crate::config::Config;

type Registry = EntityRegistry<InProcessEventBus>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter)?)
        .init();

    // Event bus and registry
    let event_bus = InProcessEventBus::default();
    tokio::spawn(log_events(event_bus.subscribe()));
    let registry = EntityRegistry::new(event_bus);

    // Integration
    let bind_addr = config.bind_addr();
    let retry = config.gree.setup_retry();
    let interval = config.gree.update_interval();
    let scan_interval = config.gree.discovery.scan_interval();
    tracing::info!(
        devices = config.gree.devices.len(),
        discovery = config.gree.discovery.enabled,
        "starting gree integration"
    );
    let integration = Arc::new(RwLock::new(GreeIntegration::new(config.gree)));
    let worker = tokio::spawn(run_integration(
        Arc::clone(&integration),
        registry.clone(),
        retry,
        interval,
        scan_interval,
    ));

    // HTTP
    let app = router::build(AppState::new(Arc::clone(&integration), registry.clone()));
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "gree-amberd listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    worker.abort();
    integration.write().await.teardown(&registry).await?;
    tracing::info!("gree-amberd stopped");
    Ok(())
}

/// Set the integration up, retrying after `retry`, then poll it every
/// `interval` and rescan every `scan_interval` until the task is aborted.
async fn run_integration(
    integration: Arc<RwLock<GreeIntegration>>,
    registry: Registry,
    retry: Duration,
    interval: Duration,
    scan_interval: Duration,
) {
    loop {
        let result = integration.write().await.setup(&registry).await;
        match result {
            Ok(()) => break,
            Err(err) => {
                tracing::warn!(
                    error = %display_chain(&err),
                    retry_secs = retry.as_secs(),
                    "setup failed, retrying"
                );
                tokio::time::sleep(retry).await;
            }
        }
    }

    // first ticks complete at once; setup just read and scanned every unit
    let mut polls = tokio::time::interval(interval);
    polls.tick().await;
    let mut scans = tokio::time::interval(scan_interval);
    scans.tick().await;
    loop {
        tokio::select! {
            _ = polls.tick() => {
                let result = integration.read().await.refresh(&registry).await;
                if let Err(err) = result {
                    tracing::warn!(error = %display_chain(&err), "refresh failed");
                }
            }
            _ = scans.tick() => {
                let result = integration.write().await.rescan(&registry).await;
                if let Err(err) = result {
                    tracing::warn!(error = %display_chain(&err), "rescan failed");
                }
            }
        }
    }
}

async fn log_events(mut events: tokio::sync::broadcast::Receiver<Event>) {
    loop {
        match events.recv().await {
            Ok(event) if event.event_type == EventType::CommandFailed => {
                tracing::warn!(
                    entity_id = ?event.entity_id,
                    data = %event.data,
                    "device command failed"
                );
            }
            Ok(event) => {
                tracing::debug!(
                    event_type = ?event.event_type,
                    entity_id = ?event.entity_id,
                    data = %event.data,
                    "event"
                );
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event log fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
