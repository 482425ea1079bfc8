//! JSON REST handlers for devices.

use axum::Json;
use axum::extract::State;

use gree_amber_app::ports::{EventPublisher, Integration};
use gree_amber_domain::device::Device;

use crate::state::AppState;

/// `GET /api/devices`
pub async fn list<I, EP>(State(state): State<AppState<I, EP>>) -> Json<Vec<Device>>
where
    I: Integration + Send + Sync + 'static,
    EP: EventPublisher + Clone + Send + Sync + 'static,
{
    Json(state.registry.list_devices())
}
