use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use reviewq_core::ReviewError;
use reviewq_remote::RemoteError;

use crate::engine::{FetchError, MutationError};

/// Carries an explicit 404 through the `anyhow::Error` chain.
#[derive(Debug)]
struct NotFoundError(String);

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for NotFoundError {}

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(NotFoundError(msg.into()).into())
    }
}

fn remote_status(err: &RemoteError) -> StatusCode {
    match err {
        RemoteError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        RemoteError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RemoteError::Conflict(_) => StatusCode::CONFLICT,
        RemoteError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        RemoteError::Server { .. } | RemoteError::Decode(_) => StatusCode::BAD_GATEWAY,
        RemoteError::Setup(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(n) = self.0.downcast_ref::<NotFoundError>() {
            let body = serde_json::json!({ "error": n.0.clone() });
            return (StatusCode::NOT_FOUND, axum::Json(body)).into_response();
        }

        let (status, message) = if let Some(e) = self.0.downcast_ref::<MutationError>() {
            let status = match e {
                MutationError::Remote { source, .. } => remote_status(source),
                MutationError::CardNotFound(_) => StatusCode::NOT_FOUND,
                MutationError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, e.user_message())
        } else if let Some(e) = self.0.downcast_ref::<FetchError>() {
            let status = match e {
                FetchError::Remote(r) => remote_status(r),
                FetchError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, e.user_message())
        } else if let Some(e) = self.0.downcast_ref::<ReviewError>() {
            let status = match e {
                ReviewError::CardNotFound(_) => StatusCode::NOT_FOUND,
                ReviewError::InvalidBucket(_)
                | ReviewError::InvalidStatus(_)
                | ReviewError::InvalidFilter(_)
                | ReviewError::InvalidRisk(_) => StatusCode::BAD_REQUEST,
                ReviewError::InvalidTransition { .. } => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, e.to_string())
        } else {
            (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string())
        };

        if status.is_server_error() {
            tracing::warn!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reviewq_core::types::CardId;

    fn rolled_back(source: RemoteError) -> AppError {
        AppError(
            MutationError::Remote {
                kind: "approve",
                card: CardId::from("c1"),
                source,
            }
            .into(),
        )
    }

    #[test]
    fn unauthorized_mutation_maps_to_401() {
        let response = rolled_back(RemoteError::Unauthorized("expired".into())).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn conflict_mutation_maps_to_409() {
        let response = rolled_back(RemoteError::Conflict("already handled".into())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn validation_mutation_maps_to_422() {
        let response =
            rolled_back(RemoteError::Validation("reason required".into())).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn transient_mutation_maps_to_503() {
        let response = rolled_back(RemoteError::Transient("reset".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn server_failure_maps_to_502() {
        let response = rolled_back(RemoteError::Server {
            status: 500,
            message: "boom".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn missing_card_maps_to_404() {
        let err = AppError(MutationError::CardNotFound(CardId::from("c9")).into());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
        let err = AppError(ReviewError::CardNotFound("c9".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_filter_maps_to_400() {
        let err = AppError(ReviewError::InvalidFilter("urgent".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unknown_error_maps_to_500() {
        let err = AppError(anyhow::anyhow!("something unexpected"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_body_is_json() {
        let response = AppError::not_found("no such objective").into_response();
        let ct = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .expect("should have content-type");
        assert!(ct.to_str().unwrap().contains("application/json"));
    }
}
