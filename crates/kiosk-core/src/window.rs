//! Window controller and its fullscreen state machine.
//!
//! ```text
//!            set_fullscreen(true)
//!  Windowed ─────────────────────────> Fullscreen
//!  decorated, saved bounds    undecorated, maximized,
//!  restored                   always-on-top for a grace period
//!           <─────────────────────────
//!            set_fullscreen(false)
//! ```
//!
//! Requesting the active state is a no-op. The controller lives on the
//! UI-affinity context; everything else reaches it through [`UiCommand`]s.

use std::sync::Arc;
use std::time::Duration;

use crate::error::WindowError;
use crate::error_log::{ErrorLog, Failure};
use crate::pages::PageResolver;
use crate::platform::{
    Bounds, EmbeddedView, NativeWindow, ScheduledTask, UiCommand, UiDispatcher, UiFlow,
    ViewEvent, ViewEventSink, ViewRuntime, WindowStyle,
};

/// Default always-on-top grace period after entering fullscreen.
pub const DEFAULT_ON_TOP_GRACE: Duration = Duration::from_secs(1);

/// Which side of the fullscreen state machine the window is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    Windowed,
    Fullscreen,
}

/// Window state owned by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    pub decorated: bool,
    pub maximized: bool,
    pub always_on_top: bool,
    /// Last windowed geometry, restored when leaving fullscreen.
    pub saved_bounds: Bounds,
}

impl WindowState {
    pub fn mode(&self) -> WindowMode {
        if self.decorated {
            WindowMode::Windowed
        } else {
            WindowMode::Fullscreen
        }
    }
}

/// Construction options for a [`WindowController`].
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Geometry used for the windowed state until the user moves the window.
    pub initial_bounds: Bounds,
    pub on_top_grace: Duration,
    /// Resolves page paths for navigation.
    pub pages: PageResolver,
    /// Page shown after a captured failure.
    pub error_page: String,
}

/// Owns the native window, the embedded view and the view runtime.
pub struct WindowController<W, V, R> {
    window: W,
    view: V,
    runtime: R,
    state: WindowState,
    options: ControllerOptions,
    dispatcher: Arc<dyn UiDispatcher>,
    errors: Arc<ErrorLog>,
    generation: u64,
    pending_release: Option<ScheduledTask>,
    view_focused: bool,
    disposed: bool,
}

impl<W, V, R> WindowController<W, V, R>
where
    W: NativeWindow,
    V: EmbeddedView,
    R: ViewRuntime,
{
    /// Takes ownership of the surface and puts it in the boot-time state.
    pub fn new(
        window: W,
        view: V,
        runtime: R,
        options: ControllerOptions,
        dispatcher: Arc<dyn UiDispatcher>,
        errors: Arc<ErrorLog>,
        start_fullscreen: bool,
    ) -> Result<Self, WindowError> {
        let mut controller = Self {
            window,
            view,
            runtime,
            state: WindowState {
                decorated: true,
                maximized: false,
                always_on_top: false,
                saved_bounds: options.initial_bounds,
            },
            options,
            dispatcher,
            errors,
            generation: 0,
            pending_release: None,
            view_focused: true,
            disposed: false,
        };

        if start_fullscreen {
            controller.window.rebuild(WindowStyle::FULLSCREEN)?;
            controller.state.decorated = false;
            controller.state.maximized = true;
            controller.begin_on_top_grace();
        } else {
            controller.window.set_bounds(controller.options.initial_bounds)?;
        }

        tracing::info!(fullscreen = start_fullscreen, "Window controller ready");
        Ok(controller)
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn mode(&self) -> WindowMode {
        self.state.mode()
    }

    /// Runs the fullscreen transition. Requesting the active state is a no-op.
    pub fn set_fullscreen(&mut self, fullscreen: bool) -> Result<(), WindowError> {
        let target = if fullscreen {
            WindowMode::Fullscreen
        } else {
            WindowMode::Windowed
        };
        if self.mode() == target {
            tracing::debug!(?target, "Window already in requested mode");
            return Ok(());
        }

        if fullscreen {
            self.state.saved_bounds = self.window.bounds();
            self.window.rebuild(WindowStyle::FULLSCREEN)?;
            self.state.decorated = false;
            self.state.maximized = true;
            self.begin_on_top_grace();
            tracing::info!("Fullscreen mode enabled");
        } else {
            self.end_on_top_grace();
            self.window.rebuild(WindowStyle::WINDOWED)?;
            self.state.decorated = true;
            self.state.maximized = false;
            self.window.set_bounds(self.state.saved_bounds)?;
            tracing::info!("Window mode restored");
        }

        Ok(())
    }

    /// Loads `page` (relative to the web root) in the embedded view.
    pub fn navigate(&mut self, page: &str) -> Result<(), WindowError> {
        let url = self.options.pages.resolve(page)?;
        tracing::debug!(%url, "Navigating");
        self.view.load_url(url.as_str())
    }

    /// Loads the diagnostic page. Failures are only logged.
    pub fn show_errors(&mut self) {
        let page = self.options.error_page.clone();
        if let Err(e) = self.navigate(&page) {
            tracing::warn!(error = %e, "Could not show the diagnostic page");
        }
    }

    /// Executes one command on the UI context.
    pub fn handle(&mut self, command: UiCommand) -> UiFlow {
        if self.disposed {
            tracing::debug!(?command, "Window disposed, command ignored");
            return UiFlow::Exit;
        }

        match command {
            UiCommand::Navigate(page) => {
                if let Err(e) = self.navigate(&page) {
                    self.errors.record_error(&e);
                }
            }
            UiCommand::ShowErrors => self.show_errors(),
            UiCommand::SetFullscreen(fullscreen) => {
                if let Err(e) = self.set_fullscreen(fullscreen) {
                    self.errors.record(
                        Failure::new(
                            "kiosk_core::window::FullscreenTransition",
                            "Failed to update fullscreen mode",
                        )
                        .with_cause(Failure::from_error(&e)),
                    );
                    self.show_errors();
                }
            }
            UiCommand::ReleaseAlwaysOnTop { generation } => {
                self.release_always_on_top(generation);
            }
            UiCommand::View(event) => return self.on_view_event(event),
            UiCommand::Shutdown => {
                // Errors are already logged; the loop exits either way.
                let _ = self.shutdown();
                return UiFlow::Exit;
            }
        }

        UiFlow::Continue
    }

    /// Disposes the view, its client, the runtime and the window, in that
    /// order. Stops at the first failure.
    pub fn shutdown(&mut self) -> Result<(), WindowError> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;
        self.end_on_top_grace();

        let result = self
            .view
            .close()
            .and_then(|()| self.view.dispose_client())
            .and_then(|()| self.runtime.dispose())
            .and_then(|()| self.window.dispose());

        match &result {
            Ok(()) => tracing::info!("Window disposed"),
            Err(e) => tracing::error!(error = %e, "Shutdown stopped early"),
        }
        result
    }

    fn begin_on_top_grace(&mut self) {
        self.cancel_pending_release();
        self.generation += 1;

        self.window.set_always_on_top(true);
        self.state.always_on_top = true;
        self.window.bring_to_front();
        self.view.focus();

        let release = UiCommand::ReleaseAlwaysOnTop {
            generation: self.generation,
        };
        match self.dispatcher.dispatch_after(self.options.on_top_grace, release) {
            Ok(task) => self.pending_release = Some(task),
            Err(e) => {
                tracing::warn!(error = %e, "Could not schedule always-on-top release");
                self.window.set_always_on_top(false);
                self.state.always_on_top = false;
            }
        }
    }

    fn end_on_top_grace(&mut self) {
        self.cancel_pending_release();
        self.generation += 1;

        if self.state.always_on_top {
            self.window.set_always_on_top(false);
            self.state.always_on_top = false;
        }
    }

    fn release_always_on_top(&mut self, generation: u64) {
        if generation != self.generation {
            tracing::debug!(generation, current = self.generation, "Stale always-on-top release");
            return;
        }

        self.pending_release = None;
        self.window.set_always_on_top(false);
        self.state.always_on_top = false;
    }

    fn cancel_pending_release(&mut self) {
        if let Some(task) = self.pending_release.take() {
            task.cancel();
        }
    }
}

impl<W, V, R> ViewEventSink for WindowController<W, V, R>
where
    W: NativeWindow,
    V: EmbeddedView,
    R: ViewRuntime,
{
    fn on_view_event(&mut self, event: ViewEvent) -> UiFlow {
        match event {
            ViewEvent::GotFocus => {
                if !self.view_focused {
                    self.view_focused = true;
                    self.view.focus();
                }
            }
            ViewEvent::TookFocus => self.view_focused = false,
            ViewEvent::LoadFailed { url, reason } => {
                self.errors
                    .record_error(&WindowError::View(format!("failed to load {url}: {reason}")));
            }
            ViewEvent::RuntimeTerminated => {
                tracing::info!("View runtime terminated");
                let _ = self.shutdown();
                return UiFlow::Exit;
            }
        }

        UiFlow::Continue
    }
}
