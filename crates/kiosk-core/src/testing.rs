//! Recording doubles for the capability traits.
//!
//! Available to this crate's tests and, behind the `test-util` feature, to
//! downstream crates.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{DispatchError, WindowError};
use crate::platform::{
    Bounds, EmbeddedView, NativeWindow, ScheduledTask, UiCommand, UiDispatcher, ViewRuntime,
    WindowStyle,
};
use crate::shell::ShellControl;

/// A command handed to [`UiDispatcher::dispatch_after`].
#[derive(Debug, Clone)]
pub struct Scheduled {
    pub delay: Duration,
    pub command: UiCommand,
    cancelled: Arc<AtomicBool>,
}

impl Scheduled {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Dispatcher that records commands instead of running them.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    commands: Mutex<Vec<UiCommand>>,
    scheduled: Mutex<Vec<Scheduled>>,
    closed: AtomicBool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later dispatch fail with [`DispatchError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Commands dispatched for immediate execution, in order.
    pub fn commands(&self) -> Vec<UiCommand> {
        self.commands.lock().clone()
    }

    /// Delayed commands, in order.
    pub fn scheduled(&self) -> Vec<Scheduled> {
        self.scheduled.lock().clone()
    }

    fn ensure_open(&self) -> Result<(), DispatchError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(DispatchError::Closed)
        } else {
            Ok(())
        }
    }
}

impl UiDispatcher for RecordingDispatcher {
    fn dispatch(&self, command: UiCommand) -> Result<(), DispatchError> {
        self.ensure_open()?;
        self.commands.lock().push(command);
        Ok(())
    }

    fn dispatch_after(
        &self,
        delay: Duration,
        command: UiCommand,
    ) -> Result<ScheduledTask, DispatchError> {
        self.ensure_open()?;

        let cancelled = Arc::new(AtomicBool::new(false));
        self.scheduled.lock().push(Scheduled {
            delay,
            command,
            cancelled: cancelled.clone(),
        });
        Ok(ScheduledTask::new(move || cancelled.store(true, Ordering::SeqCst)))
    }
}

/// A call made on one of the fake surface parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Rebuild(WindowStyle),
    SetBounds(Bounds),
    AlwaysOnTop(bool),
    BringToFront,
    FocusView,
    CloseView,
    DisposeClient,
    DisposeRuntime,
    DisposeWindow,
}

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Rebuild,
    SetBounds,
    LoadUrl,
    CloseView,
    DisposeClient,
    DisposeRuntime,
    DisposeWindow,
}

#[derive(Debug)]
struct SurfaceState {
    calls: Vec<SurfaceCall>,
    loaded_urls: Vec<String>,
    bounds: Bounds,
    always_on_top: bool,
    faults: HashSet<Fault>,
}

/// Shared view into the fake window, view and runtime.
#[derive(Debug, Clone)]
pub struct SurfaceProbe {
    state: Arc<Mutex<SurfaceState>>,
}

impl SurfaceProbe {
    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn loaded_urls(&self) -> Vec<String> {
        self.state.lock().loaded_urls.clone()
    }

    pub fn bounds(&self) -> Bounds {
        self.state.lock().bounds
    }

    pub fn always_on_top(&self) -> bool {
        self.state.lock().always_on_top
    }

    /// Simulates the user moving or resizing the window.
    pub fn move_window(&self, bounds: Bounds) {
        self.state.lock().bounds = bounds;
    }

    /// Makes `fault` fail from now on.
    pub fn fail_on(&self, fault: Fault) {
        self.state.lock().faults.insert(fault);
    }

    fn call(&self, call: SurfaceCall, fault: Option<Fault>) -> Result<(), WindowError> {
        let mut state = self.state.lock();
        state.calls.push(call.clone());
        match fault {
            Some(fault) if state.faults.contains(&fault) => {
                Err(WindowError::Native(format!("injected failure: {call:?}")))
            }
            _ => Ok(()),
        }
    }
}

/// Creates a fake window, view and runtime sharing one probe.
pub fn surface() -> (SurfaceProbe, FakeWindow, FakeView, FakeRuntime) {
    let probe = SurfaceProbe {
        state: Arc::new(Mutex::new(SurfaceState {
            calls: Vec::new(),
            loaded_urls: Vec::new(),
            bounds: Bounds::new(0, 0, 800, 600),
            always_on_top: false,
            faults: HashSet::new(),
        })),
    };

    (
        probe.clone(),
        FakeWindow {
            probe: probe.clone(),
        },
        FakeView {
            probe: probe.clone(),
        },
        FakeRuntime { probe },
    )
}

#[derive(Debug)]
pub struct FakeWindow {
    probe: SurfaceProbe,
}

impl NativeWindow for FakeWindow {
    fn bounds(&self) -> Bounds {
        self.probe.bounds()
    }

    fn rebuild(&mut self, style: WindowStyle) -> Result<(), WindowError> {
        self.probe
            .call(SurfaceCall::Rebuild(style), Some(Fault::Rebuild))
    }

    fn set_bounds(&mut self, bounds: Bounds) -> Result<(), WindowError> {
        self.probe
            .call(SurfaceCall::SetBounds(bounds), Some(Fault::SetBounds))?;
        self.probe.move_window(bounds);
        Ok(())
    }

    fn set_always_on_top(&mut self, on_top: bool) {
        let _ = self.probe.call(SurfaceCall::AlwaysOnTop(on_top), None);
        self.probe.state.lock().always_on_top = on_top;
    }

    fn bring_to_front(&mut self) {
        let _ = self.probe.call(SurfaceCall::BringToFront, None);
    }

    fn dispose(&mut self) -> Result<(), WindowError> {
        self.probe
            .call(SurfaceCall::DisposeWindow, Some(Fault::DisposeWindow))
    }
}

#[derive(Debug)]
pub struct FakeView {
    probe: SurfaceProbe,
}

impl EmbeddedView for FakeView {
    fn load_url(&mut self, url: &str) -> Result<(), WindowError> {
        let mut state = self.probe.state.lock();
        if state.faults.contains(&Fault::LoadUrl) {
            return Err(WindowError::View(format!("injected failure loading {url}")));
        }
        state.loaded_urls.push(url.to_string());
        Ok(())
    }

    fn focus(&mut self) {
        let _ = self.probe.call(SurfaceCall::FocusView, None);
    }

    fn close(&mut self) -> Result<(), WindowError> {
        self.probe.call(SurfaceCall::CloseView, Some(Fault::CloseView))
    }

    fn dispose_client(&mut self) -> Result<(), WindowError> {
        self.probe
            .call(SurfaceCall::DisposeClient, Some(Fault::DisposeClient))
    }
}

#[derive(Debug)]
pub struct FakeRuntime {
    probe: SurfaceProbe,
}

impl ViewRuntime for FakeRuntime {
    fn dispose(&mut self) -> Result<(), WindowError> {
        self.probe
            .call(SurfaceCall::DisposeRuntime, Some(Fault::DisposeRuntime))
    }
}

/// A call made on [`RecordingShell`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCall {
    Navigate(String),
    ShowErrors,
    Terminate,
}

/// Shell control that records calls instead of acting on them.
#[derive(Debug, Default)]
pub struct RecordingShell {
    calls: Mutex<Vec<ShellCall>>,
}

impl RecordingShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ShellCall> {
        self.calls.lock().clone()
    }
}

impl ShellControl for RecordingShell {
    fn navigate(&self, page: &str) {
        self.calls.lock().push(ShellCall::Navigate(page.to_string()));
    }

    fn show_errors(&self) {
        self.calls.lock().push(ShellCall::ShowErrors);
    }

    fn terminate(&self) {
        self.calls.lock().push(ShellCall::Terminate);
    }
}
