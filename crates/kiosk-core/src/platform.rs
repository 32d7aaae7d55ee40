//! Capabilities the shell drives but does not implement.
//!
//! The native window, the embedded view and its runtime are owned by the
//! UI-affinity context and are never touched from request tasks. Request
//! tasks reach them only by enqueueing a [`UiCommand`] through a
//! [`UiDispatcher`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{DispatchError, WindowError};

/// Outer window geometry in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Decoration and extent requested when a native window is (re)built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStyle {
    pub decorated: bool,
    pub maximized: bool,
}

impl WindowStyle {
    /// Decorated, normal extent.
    pub const WINDOWED: Self = Self {
        decorated: true,
        maximized: false,
    };

    /// Undecorated, maximized.
    pub const FULLSCREEN: Self = Self {
        decorated: false,
        maximized: true,
    };
}

/// The native top-level window.
pub trait NativeWindow {
    /// Current outer geometry.
    fn bounds(&self) -> Bounds;

    /// Disposes the native surface and recreates it with `style`.
    fn rebuild(&mut self, style: WindowStyle) -> Result<(), WindowError>;

    /// Moves and resizes the window.
    fn set_bounds(&mut self, bounds: Bounds) -> Result<(), WindowError>;

    fn set_always_on_top(&mut self, on_top: bool);

    /// Raises the window and requests keyboard focus.
    fn bring_to_front(&mut self);

    fn dispose(&mut self) -> Result<(), WindowError>;
}

/// The browser view hosted inside the native window.
pub trait EmbeddedView {
    fn load_url(&mut self, url: &str) -> Result<(), WindowError>;

    /// Gives keyboard focus to the view.
    fn focus(&mut self);

    /// Closes the browser view.
    fn close(&mut self) -> Result<(), WindowError>;

    /// Releases the browser client and its session.
    fn dispose_client(&mut self) -> Result<(), WindowError>;
}

/// The process-wide embedded-view runtime.
pub trait ViewRuntime {
    fn dispose(&mut self) -> Result<(), WindowError>;
}

/// Events reported by the embedded view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    /// The view received keyboard focus.
    GotFocus,
    /// The view handed keyboard focus to the host window.
    TookFocus,
    /// A page failed to load.
    LoadFailed { url: String, reason: String },
    /// The runtime terminated or started shutting down.
    RuntimeTerminated,
}

/// Receiver of [`ViewEvent`]s, registered with the embedded view.
///
/// Dispatch happens on the UI-affinity context only.
pub trait ViewEventSink {
    fn on_view_event(&mut self, event: ViewEvent) -> UiFlow;
}

/// Work executed on the UI-affinity context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    /// Load a page path relative to the web root.
    Navigate(String),
    /// Load the diagnostic page.
    ShowErrors,
    /// Run the fullscreen transition.
    SetFullscreen(bool),
    /// Clear always-on-top if `generation` is still the current transition.
    ReleaseAlwaysOnTop { generation: u64 },
    /// Deliver a view event that originated off the UI context.
    View(ViewEvent),
    /// Dispose the window and stop the UI loop.
    Shutdown,
}

/// Whether the UI loop should keep running after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiFlow {
    Continue,
    Exit,
}

/// Handle to a delayed command that has not run yet.
pub struct ScheduledTask {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ScheduledTask {
    /// Wraps the action that cancels the delayed command.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A task that cannot be cancelled.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    /// Cancels the delayed command. A command already queued on the UI
    /// context may still arrive.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

/// Enqueues work onto the UI-affinity context.
pub trait UiDispatcher: Send + Sync {
    /// Enqueues `command`; returns without waiting for it to run.
    fn dispatch(&self, command: UiCommand) -> Result<(), DispatchError>;

    /// Enqueues `command` once `delay` has elapsed.
    fn dispatch_after(
        &self,
        delay: Duration,
        command: UiCommand,
    ) -> Result<ScheduledTask, DispatchError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_scheduled_task_cancel_runs_once() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        let task = ScheduledTask::new(move || flag.store(true, Ordering::SeqCst));
        task.cancel();

        assert!(cancelled.load(Ordering::SeqCst));
        ScheduledTask::detached().cancel();
    }

    #[test]
    fn test_window_styles() {
        assert!(WindowStyle::WINDOWED.decorated);
        assert!(!WindowStyle::WINDOWED.maximized);
        assert!(!WindowStyle::FULLSCREEN.decorated);
        assert!(WindowStyle::FULLSCREEN.maximized);
    }
}
