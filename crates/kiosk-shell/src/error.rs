//! Error types for the kiosk shell.

use kiosk_server::ServerError;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),
}

/// Errors raised while wiring up the shell.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to resolve web root {path}: {source}")]
    WebRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Server(#[from] ServerError),
}
