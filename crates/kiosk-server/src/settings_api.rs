//! Settings endpoints.
//!
//! ## Endpoints
//!
//! - `GET /api/app/settings` - all settings and the available themes
//! - `GET /api/app/settings/themes` - available themes and the current one
//! - `GET /api/app/settings/{key}` - one setting
//! - `PUT /api/app/settings/{key}` - set a recognized setting
//! - `PATCH /api/app/settings/{key}` - update a setting that already has a value
//! - `POST /api/app/settings/fullscreen/toggle` - flip fullscreen mode

use axum::{
    body::Bytes,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use kiosk_core::{SettingKey, UpdateMode, AVAILABLE_THEMES};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::api::{ApiError, AppState};

/// Create the settings routes.
pub fn settings_routes() -> Router<AppState> {
    Router::new()
        .route("/api/app/settings", get(get_all_settings))
        .route("/api/app/settings/themes", get(get_themes))
        .route(
            "/api/app/settings/fullscreen/toggle",
            post(toggle_fullscreen),
        )
        .route(
            "/api/app/settings/{key}",
            get(get_setting).put(put_setting).patch(patch_setting),
        )
}

/// Outcome of reading an update body.
#[derive(Debug, PartialEq)]
pub enum ValueBody {
    /// The body is a JSON object with a `value` field.
    Value(Value),
    /// The body is empty or has no `value` field.
    Missing,
    /// The body is not valid JSON.
    Malformed(String),
}

/// Parses an update body of the form `{"value": ...}`.
pub fn parse_value_body(body: &[u8]) -> ValueBody {
    if body.iter().all(u8::is_ascii_whitespace) {
        return ValueBody::Missing;
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(mut fields)) => match fields.remove("value") {
            Some(value) => ValueBody::Value(value),
            None => ValueBody::Missing,
        },
        Ok(_) => ValueBody::Missing,
        Err(e) => ValueBody::Malformed(e.to_string()),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsResponse {
    success: bool,
    settings: BTreeMap<SettingKey, Value>,
    available_themes: Vec<&'static str>,
}

#[derive(Serialize)]
struct SettingResponse {
    success: bool,
    key: String,
    value: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResponse {
    success: bool,
    key: String,
    old_value: Option<Value>,
    new_value: Value,
    message: &'static str,
}

#[derive(Serialize)]
struct ThemesResponse {
    success: bool,
    themes: Vec<&'static str>,
    current: String,
}

#[derive(Serialize)]
struct ToggleResponse {
    success: bool,
    fullscreen: bool,
    message: &'static str,
}

async fn get_all_settings(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.settings.get_all();
    Json(SettingsResponse {
        success: true,
        settings: snapshot.settings,
        available_themes: snapshot.available_themes,
    })
}

async fn get_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let value = state.settings.get(&key)?;
    Ok(Json(SettingResponse {
        success: true,
        key,
        value,
    }))
}

async fn put_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    off_runtime(move || update_setting(&state, key, &body, UpdateMode::Upsert)).await
}

async fn patch_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    off_runtime(move || update_setting(&state, key, &body, UpdateMode::Patch)).await
}

/// Runs a settings write on the blocking pool. Writes fsync while holding
/// the store lock.
async fn off_runtime<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        // Let the panic layer see handler panics.
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(ApiError::internal(&e)),
    }
}

fn update_setting(
    state: &AppState,
    key: String,
    body: &[u8],
    mode: UpdateMode,
) -> Result<Json<UpdateResponse>, ApiError> {
    // A missing key is reported before the body is looked at.
    if mode == UpdateMode::Patch {
        state.settings.get(&key)?;
    }

    let value = match parse_value_body(body) {
        ValueBody::Value(value) => value,
        ValueBody::Missing => {
            return Err(ApiError::BadRequest(
                "Missing 'value' field in request body".to_string(),
            ))
        }
        ValueBody::Malformed(reason) => {
            return Err(ApiError::BadRequest(format!("Invalid JSON format: {reason}")))
        }
    };

    let change = state.settings.update(&key, value, mode)?;
    Ok(Json(UpdateResponse {
        success: true,
        key,
        old_value: change.old_value,
        new_value: change.new_value,
        message: "Setting updated successfully",
    }))
}

async fn get_themes(State(state): State<AppState>) -> impl IntoResponse {
    Json(ThemesResponse {
        success: true,
        themes: AVAILABLE_THEMES.to_vec(),
        current: state.settings.current_theme(),
    })
}

async fn toggle_fullscreen(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let fullscreen = off_runtime(move || Ok(state.settings.toggle_fullscreen()?)).await?;
    Ok(Json(ToggleResponse {
        success: true,
        fullscreen,
        message: "Fullscreen mode toggled successfully",
    }))
}
