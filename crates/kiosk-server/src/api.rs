//! Router, shared state and error responses for the control server.

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use kiosk_core::{ErrorLog, Failure, PageResolver, Pages, SettingsError, SettingsStore, ShellControl};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::error_api::error_routes;
use crate::failure::{capture_failures, panic_response, CapturedFailure};
use crate::realtime_api::realtime_routes;
use crate::settings_api::settings_routes;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Captured failures.
    pub errors: Arc<ErrorLog>,
    /// Persisted settings.
    pub settings: Arc<SettingsStore>,
    /// Actions on the running shell.
    pub shell: Arc<dyn ShellControl>,
    /// Well-known pages.
    pub pages: Arc<Pages>,
    /// Resolves pages to loadable URLs.
    pub resolver: Arc<PageResolver>,
}

/// API error type.
///
/// Every variant renders as `{success: false, error}`. `Internal` also
/// hands its captured failure to the failure layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(Failure),
}

impl ApiError {
    /// Wraps an unexpected error for capture.
    pub fn internal<E: std::error::Error + 'static>(error: &E) -> Self {
        ApiError::Internal(Failure::from_error(error))
    }
}

impl From<SettingsError> for ApiError {
    fn from(error: SettingsError) -> Self {
        match error {
            SettingsError::UnknownKey(key) => {
                ApiError::BadRequest(SettingsError::InvalidValue(key).to_string())
            }
            SettingsError::InvalidValue(_) => ApiError::BadRequest(error.to_string()),
            SettingsError::NotFound(_) => ApiError::NotFound(error.to_string()),
            SettingsError::Persist { .. } | SettingsError::Encode(_) => ApiError::internal(&error),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            success: false,
            error: match &self {
                ApiError::Internal(failure) => failure
                    .message
                    .clone()
                    .unwrap_or_else(|| failure.kind.clone()),
                _ => self.to_string(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::Internal(failure) = self {
            response.extensions_mut().insert(CapturedFailure(failure));
        }
        response
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

/// Creates the API router with failure capture, tracing and CORS.
pub fn create_router(state: AppState) -> Router {
    with_layers(routes(), state)
}

/// Routes of every handler module, without middleware.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .merge(error_routes())
        .merge(settings_routes())
        .merge(realtime_routes())
}

/// Wraps `routes` in the middleware stack and attaches `state`.
///
/// Panics and `ApiError::Internal` responses are recorded into the error
/// log, answered with 500 and followed by the diagnostic page.
pub fn with_layers(routes: Router<AppState>, state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(state.clone(), capture_failures))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_errors_map_to_statuses() {
        let cases = [
            (SettingsError::UnknownKey("volume".into()), StatusCode::BAD_REQUEST),
            (SettingsError::InvalidValue("theme".into()), StatusCode::BAD_REQUEST),
            (SettingsError::NotFound("theme".into()), StatusCode::NOT_FOUND),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError::from(error).into_response().status(), status);
        }
    }

    #[test]
    fn test_unknown_key_reads_as_invalid_value() {
        let error = ApiError::from(SettingsError::UnknownKey("volume".into()));
        assert_eq!(error.to_string(), "Invalid value for setting: volume");
    }

    #[test]
    fn test_internal_error_carries_failure() {
        let error = ApiError::from(SettingsError::Persist {
            path: "kiosk_settings.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        });

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let captured = response.extensions().get::<CapturedFailure>().unwrap();
        assert!(captured.0.kind.ends_with("SettingsError"));
        assert!(captured.0.cause.is_some());
    }
}
