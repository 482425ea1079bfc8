//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use gree_amber_domain::error::HubError;

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps [`HubError`] to an HTTP response with appropriate status code.
#[derive(Debug)]
pub struct ApiError(HubError);

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            HubError::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            HubError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string()),
            HubError::Setup(err) => {
                tracing::warn!(error = %err, "integration not ready");
                (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
            HubError::Command(err) => {
                tracing::warn!(error = %err, "device command failed");
                (StatusCode::BAD_GATEWAY, err.to_string())
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gree_amber_domain::error::{CommandError, NotFoundError, SetupError, ValidationError};

    #[derive(Debug)]
    struct Boom;

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("boom")
        }
    }

    impl std::error::Error for Boom {}

    fn status(err: HubError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn should_map_each_error_kind_to_status() {
        assert_eq!(
            status(ValidationError::EmptyHost.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(
                NotFoundError {
                    entity: "Entity",
                    id: "x".to_string(),
                }
                .into()
            ),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(
                SetupError {
                    host: "10.0.0.1".to_string(),
                    source: Box::new(Boom),
                }
                .into()
            ),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(
                CommandError {
                    device: "AC".to_string(),
                    source: Box::new(Boom),
                }
                .into()
            ),
            StatusCode::BAD_GATEWAY
        );
    }
}
