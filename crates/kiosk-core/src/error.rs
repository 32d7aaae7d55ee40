//! Error types for the kiosk core.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the settings pipeline.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Key is not one of the recognized settings.
    #[error("unknown setting: {0}")]
    UnknownKey(String),

    /// Strict update on a key that was never initialized.
    #[error("Setting not found: {0}")]
    NotFound(String),

    /// Value failed the key's type or domain rule.
    #[error("Invalid value for setting: {0}")]
    InvalidValue(String),

    /// The settings file could not be written.
    #[error("failed to persist settings to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings object could not be encoded.
    #[error("failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The UI event loop no longer accepts commands.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("ui event loop is closed")]
    Closed,
}

/// Errors raised while driving the native window or the embedded view.
#[derive(Debug, Error)]
pub enum WindowError {
    /// Native windowing toolkit failure.
    #[error("native window error: {0}")]
    Native(String),

    /// Embedded view failure.
    #[error("embedded view error: {0}")]
    View(String),

    /// Page path could not be turned into a loadable URL.
    #[error("invalid page path: {0}")]
    InvalidPage(String),

    /// Work could not be scheduled on the UI context.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
