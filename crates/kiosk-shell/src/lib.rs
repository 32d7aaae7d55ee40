//! # Kiosk Shell
//!
//! Wires the kiosk shell together: layered configuration, logging, the
//! [`ShellCoordinator`] that owns the error log and settings store, starts
//! the control server and sequences the first navigation.
//!
//! ## Startup
//!
//! 1. load [`ShellConfig`] and initialize logging
//! 2. create the UI event loop and its dispatcher
//! 3. [`ShellCoordinator::new`] opens the settings store
//! 4. [`ShellCoordinator::start_server`] binds the control server
//! 5. [`ShellCoordinator::attach_window`] hands the surface to a
//!    `WindowController`, fullscreen if the boot flag says so
//! 6. [`ShellCoordinator::begin_navigation`] shows the loading page, then
//!    the home page
//!
//! Shutdown stops the control server first, then disposes the window.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod observability;

pub use config::{Overrides, ShellConfig};
pub use coordinator::{ExitFn, ShellCoordinator, ShellHandle};
pub use error::{ConfigError, ShellError};
pub use observability::{LogConfig, LogFormat};
