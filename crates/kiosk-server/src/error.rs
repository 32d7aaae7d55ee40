//! Error types for the control server.

use std::net::SocketAddr;
use thiserror::Error;

/// Boxed transport error from a socket session.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while binding or running the control server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The control server only listens on loopback interfaces.
    #[error("refusing to bind control server to non-loopback address {0}")]
    NonLoopback(SocketAddr),

    #[error("failed to bind control server to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("control server failed: {0}")]
    Serve(#[source] std::io::Error),

    /// The serving task panicked or was aborted.
    #[error("control server task ended abnormally: {0}")]
    Task(String),
}

/// Failures inside a settings socket session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to encode socket message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("socket transport failed: {0}")]
    Transport(#[source] BoxError),
}
