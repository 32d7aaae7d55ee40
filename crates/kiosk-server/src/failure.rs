//! Top-level failure capture.
//!
//! Handlers report unexpected failures by returning `ApiError::Internal`,
//! which stashes the captured [`Failure`] in the response extensions. The
//! middleware here is the only place such failures become user-visible:
//! it records them, forces a 500 and shows the diagnostic page.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use kiosk_core::Failure;
use std::any::Any;

use crate::api::{ApiError, AppState};

/// A failure waiting to be recorded by [`capture_failures`].
#[derive(Debug, Clone)]
pub struct CapturedFailure(pub Failure);

/// Records captured failures and shows the diagnostic page.
pub async fn capture_failures(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let mut response = next.run(request).await;

    if let Some(CapturedFailure(failure)) = response.extensions_mut().remove::<CapturedFailure>() {
        tracing::warn!(%method, %uri, kind = %failure.kind, "Request failed");
        state.errors.record(failure);
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        state.shell.show_errors();
    }

    response
}

/// Turns a handler panic into a captured failure.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    ApiError::Internal(Failure::from_panic(&*payload)).into_response()
}
