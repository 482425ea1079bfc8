//! JSON REST handlers for entities and their service calls.

use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use gree_amber_app::ports::{EventPublisher, Integration};
use gree_amber_domain::entity::Entity;
use gree_amber_domain::error::{HubError, NotFoundError, ValidationError};
use gree_amber_domain::id::EntityId;

use crate::error::ApiError;
use crate::state::AppState;

/// Possible responses from the list endpoint.
pub enum ListResponse {
    Ok(Json<Vec<Entity>>),
}

impl IntoResponse for ListResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// Possible responses from the get and service call endpoints.
pub enum GetResponse {
    Ok(Json<Entity>),
}

impl IntoResponse for GetResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

fn parse_id(id: &str) -> Result<EntityId, ApiError> {
    EntityId::from_str(id).map_err(|_| {
        ApiError::from(HubError::from(ValidationError::InvalidId { id: id.to_string() }))
    })
}

/// `GET /api/entities`
pub async fn list<I, EP>(State(state): State<AppState<I, EP>>) -> ListResponse
where
    I: Integration + Send + Sync + 'static,
    EP: EventPublisher + Clone + Send + Sync + 'static,
{
    ListResponse::Ok(Json(state.registry.list_entities()))
}

/// `GET /api/entities/{id}`
pub async fn get<I, EP>(
    State(state): State<AppState<I, EP>>,
    Path(id): Path<String>,
) -> Result<GetResponse, ApiError>
where
    I: Integration + Send + Sync + 'static,
    EP: EventPublisher + Clone + Send + Sync + 'static,
{
    let entity = state.registry.get_entity(parse_id(&id)?)?;
    Ok(GetResponse::Ok(Json(entity)))
}

/// `POST /api/entities/{id}/services/{service}`
///
/// The optional JSON body is the service data (`{"temperature": 21}`).
pub async fn call_service<I, EP>(
    State(state): State<AppState<I, EP>>,
    Path((id, service)): Path<(String, String)>,
    body: Option<Json<Value>>,
) -> Result<GetResponse, ApiError>
where
    I: Integration + Send + Sync + 'static,
    EP: EventPublisher + Clone + Send + Sync + 'static,
{
    let entity_id = parse_id(&id)?;
    let data = body.map_or_else(|| Value::Object(serde_json::Map::new()), |Json(data)| data);

    let integration = state.integration.read().await;
    if !integration.owns_entity(entity_id) {
        return Err(HubError::from(NotFoundError {
            entity: "Entity",
            id: entity_id.to_string(),
        })
        .into());
    }
    tracing::debug!(%entity_id, %service, "calling service");
    let entity = integration
        .handle_service_call(&state.registry, entity_id, &service, data)
        .await?;
    Ok(GetResponse::Ok(Json(entity)))
}
