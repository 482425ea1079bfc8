//! Shared application state for axum handlers.

use std::sync::Arc;

use tokio::sync::RwLock;

use gree_amber_app::ports::{EventPublisher, Integration};
use gree_amber_app::services::entity_registry::EntityRegistry;

/// Application state shared across all axum handlers.
///
/// Handlers take a read lock on the integration; the daemon takes the write
/// lock for setup and teardown. `Clone` is implemented manually so the
/// integration itself does not need to be `Clone`.
pub struct AppState<I, EP> {
    pub integration: Arc<RwLock<I>>,
    /// Everything the integration registered.
    pub registry: EntityRegistry<EP>,
}

impl<I, EP: Clone> Clone for AppState<I, EP> {
    fn clone(&self) -> Self {
        Self {
            integration: Arc::clone(&self.integration),
            registry: self.registry.clone(),
        }
    }
}

impl<I, EP> AppState<I, EP>
where
    I: Integration + Send + Sync + 'static,
    EP: EventPublisher + Clone + Send + Sync + 'static,
{
    /// Create a new application state from an already shared integration.
    pub fn new(integration: Arc<RwLock<I>>, registry: EntityRegistry<EP>) -> Self {
        Self {
            integration,
            registry,
        }
    }
}
