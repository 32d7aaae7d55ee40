//! # Kiosk Core
//!
//! Domain types for a single-window kiosk shell hosting a local web UI.
//!
//! ## Components
//!
//! - [`ErrorLog`]: process-wide, time-ordered store of captured failures
//! - [`SettingsStore`]: persisted settings with validation, change
//!   notification and fullscreen side effects
//! - [`WindowController`]: fullscreen state machine, focus hand-back and
//!   ordered disposal of the window and embedded view
//!
//! The native window and embedded view are abstracted behind the traits in
//! [`platform`]; they are only ever touched on the UI-affinity context, which
//! everything else reaches through a [`UiDispatcher`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use kiosk_core::{ErrorLog, SettingsStore};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let errors = Arc::new(ErrorLog::new());
//! let settings = SettingsStore::open("kiosk_settings.json", errors.clone());
//!
//! settings.set("theme", json!("orange")).unwrap();
//! assert_eq!(settings.current_theme(), "orange");
//! ```

pub mod error;
pub mod error_log;
pub mod pages;
pub mod platform;
pub mod settings;
pub mod shell;
pub mod window;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::{DispatchError, SettingsError, WindowError};
pub use error_log::{ErrorLog, ErrorRecord, Failure};
pub use pages::{PageResolver, Pages};
pub use platform::{
    Bounds, EmbeddedView, NativeWindow, ScheduledTask, UiCommand, UiDispatcher, UiFlow,
    ViewEvent, ViewEventSink, ViewRuntime, WindowStyle,
};
pub use settings::{
    SettingChange, SettingKey, SettingsSnapshot, SettingsStore, UpdateMode, AVAILABLE_THEMES,
};
pub use shell::ShellControl;
pub use window::{ControllerOptions, WindowController, WindowMode, WindowState};
