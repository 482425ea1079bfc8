//! JSON REST API handler modules.

#[allow(clippy::missing_errors_doc)]
pub mod devices;
#[allow(clippy::missing_errors_doc)]
pub mod entities;

use axum::Router;
use axum::routing::{get, post};

use gree_amber_app::ports::{EventPublisher, Integration};

use crate::state::AppState;

/// Build the `/api` sub-router.
pub fn routes<I, EP>() -> Router<AppState<I, EP>>
where
    I: Integration + Send + Sync + 'static,
    EP: EventPublisher + Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/entities", get(entities::list::<I, EP>))
        .route("/entities/{id}", get(entities::get::<I, EP>))
        .route(
            "/entities/{id}/services/{service}",
            post(entities::call_service::<I, EP>),
        )
        .route("/devices", get(devices::list::<I, EP>))
}
