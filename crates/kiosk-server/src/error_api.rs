//! Error introspection and process control endpoints.
//!
//! - `GET /errors` - captured failures, oldest first
//! - `GET /errorSummary` - redirect to the static diagnostic page
//! - `GET /reboot` - terminate the process

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::get,
    Json, Router,
};
use kiosk_core::ErrorRecord;

use crate::api::{ApiError, AppState};

/// Create the error introspection routes.
pub fn error_routes() -> Router<AppState> {
    Router::new()
        .route("/errors", get(list_errors))
        .route("/errorSummary", get(error_summary))
        .route("/reboot", get(reboot))
}

async fn list_errors(State(state): State<AppState>) -> Json<Vec<ErrorRecord>> {
    Json(state.errors.list())
}

async fn error_summary(State(state): State<AppState>) -> Result<Redirect, ApiError> {
    let url = state
        .resolver
        .resolve(&state.pages.error_summary)
        .map_err(|e| ApiError::internal(&e))?;

    Ok(Redirect::to(url.as_str()))
}

async fn reboot(State(state): State<AppState>) -> impl IntoResponse {
    tracing::warn!("Reboot requested over the control server");
    state.shell.terminate();
    StatusCode::OK
}
