//! # Kiosk Server
//!
//! Local control server for the kiosk shell. The rendered web UI talks to
//! the shell exclusively through these endpoints.
//!
//! ## Routes
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /health` | Liveness probe |
//! | `GET /errors` | Captured failures |
//! | `GET /errorSummary` | Redirect to the diagnostic page |
//! | `GET /reboot` | Terminate the process |
//! | `/api/app/settings/...` | Settings read and update |
//! | `GET /ws/settings` | Live settings changes |
//!
//! Unexpected failures, including handler panics, are recorded into the
//! error log, answered with 500 and followed by the diagnostic page.

pub mod api;
pub mod error;
pub mod error_api;
pub mod failure;
pub mod realtime_api;
pub mod server;
pub mod settings_api;

pub use api::{create_router, routes, with_layers, ApiError, AppState};
pub use error::{ServerError, SessionError};
pub use server::{ControlServer, ServerHandle, DEFAULT_ADDR};
