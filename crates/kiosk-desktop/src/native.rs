//! tao/wry backend for the window capabilities.
//!
//! Everything in here lives on the main thread, which owns the tao event
//! loop. Other threads reach it through [`ProxyDispatcher`].

use kiosk_core::{
    Bounds, DispatchError, EmbeddedView, NativeWindow, ScheduledTask, UiCommand, UiDispatcher,
    ViewRuntime, WindowError, WindowStyle,
};
use kiosk_shell::ShellConfig;
use parking_lot::Mutex;
use std::path::Path;
use std::time::Duration;
use tao::dpi::{PhysicalPosition, PhysicalSize};
use tao::event_loop::{EventLoop, EventLoopProxy};
use tao::window::{Icon, Window, WindowBuilder};
use tokio::runtime::Handle;
use wry::{WebContext, WebView, WebViewBuilder};

/// Enqueues commands onto the tao event loop.
pub struct ProxyDispatcher {
    proxy: Mutex<EventLoopProxy<UiCommand>>,
    runtime: Handle,
}

impl ProxyDispatcher {
    /// Delayed commands are timed on `runtime`.
    pub fn new(proxy: EventLoopProxy<UiCommand>, runtime: Handle) -> Self {
        Self {
            proxy: Mutex::new(proxy),
            runtime,
        }
    }
}

impl UiDispatcher for ProxyDispatcher {
    fn dispatch(&self, command: UiCommand) -> Result<(), DispatchError> {
        self.proxy
            .lock()
            .send_event(command)
            .map_err(|_| DispatchError::Closed)
    }

    fn dispatch_after(
        &self,
        delay: Duration,
        command: UiCommand,
    ) -> Result<ScheduledTask, DispatchError> {
        let proxy = self.proxy.lock().clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if proxy.send_event(command).is_err() {
                tracing::debug!("Event loop closed before delayed command");
            }
        });

        let abort = task.abort_handle();
        Ok(ScheduledTask::new(move || abort.abort()))
    }
}

fn native<E: std::fmt::Display>(e: E) -> WindowError {
    WindowError::Native(e.to_string())
}

fn view<E: std::fmt::Display>(e: E) -> WindowError {
    WindowError::View(e.to_string())
}

/// The kiosk's top-level tao window.
///
/// tao restyles a live window, so [`NativeWindow::rebuild`] changes
/// decorations and extent in place.
pub struct TaoWindow {
    window: Option<Window>,
}

impl TaoWindow {
    fn live(&self) -> Result<&Window, WindowError> {
        self.window
            .as_ref()
            .ok_or_else(|| WindowError::Native("window disposed".to_string()))
    }
}

impl NativeWindow for TaoWindow {
    fn bounds(&self) -> Bounds {
        let Some(window) = &self.window else {
            return Bounds::new(0, 0, 0, 0);
        };
        let position = window
            .outer_position()
            .unwrap_or_else(|_| PhysicalPosition::new(0, 0));
        // Measured the same way `set_bounds` applies it.
        let size = window.inner_size();
        Bounds::new(position.x, position.y, size.width, size.height)
    }

    fn rebuild(&mut self, style: WindowStyle) -> Result<(), WindowError> {
        let window = self.live()?;
        window.set_decorations(style.decorated);
        window.set_maximized(style.maximized);
        Ok(())
    }

    fn set_bounds(&mut self, bounds: Bounds) -> Result<(), WindowError> {
        let window = self.live()?;
        window.set_outer_position(PhysicalPosition::new(bounds.x, bounds.y));
        window.set_inner_size(PhysicalSize::new(bounds.width, bounds.height));
        Ok(())
    }

    fn set_always_on_top(&mut self, on_top: bool) {
        if let Some(window) = &self.window {
            window.set_always_on_top(on_top);
        }
    }

    fn bring_to_front(&mut self) {
        if let Some(window) = &self.window {
            window.set_visible(true);
            window.set_focus();
        }
    }

    fn dispose(&mut self) -> Result<(), WindowError> {
        self.window.take();
        Ok(())
    }
}

/// The wry webview hosted in the kiosk window.
pub struct WryView {
    webview: Option<WebView>,
}

impl WryView {
    fn live(&self) -> Result<&WebView, WindowError> {
        self.webview
            .as_ref()
            .ok_or_else(|| WindowError::View("webview closed".to_string()))
    }
}

impl EmbeddedView for WryView {
    fn load_url(&mut self, url: &str) -> Result<(), WindowError> {
        self.live()?.load_url(url).map_err(view)
    }

    fn focus(&mut self) {
        if let Some(webview) = &self.webview {
            if let Err(e) = webview.focus() {
                tracing::debug!(error = %e, "Could not focus webview");
            }
        }
    }

    fn close(&mut self) -> Result<(), WindowError> {
        self.webview.take();
        Ok(())
    }

    fn dispose_client(&mut self) -> Result<(), WindowError> {
        // wry releases the session together with the webview.
        tracing::debug!("Webview session released");
        Ok(())
    }
}

/// The webview data context (cookies, cache) shared by the view.
pub struct WryRuntime {
    context: Option<WebContext>,
}

impl ViewRuntime for WryRuntime {
    fn dispose(&mut self) -> Result<(), WindowError> {
        self.context.take();
        Ok(())
    }
}

/// The native surface handed to the window controller.
pub struct Surface {
    pub window: TaoWindow,
    pub view: WryView,
    pub runtime: WryRuntime,
}

/// Creates the kiosk window and its webview, showing a blank page.
pub fn build_surface(
    event_loop: &EventLoop<UiCommand>,
    config: &ShellConfig,
) -> Result<Surface, WindowError> {
    let settings = &config.window;
    let mut builder = WindowBuilder::new()
        .with_title(&settings.title)
        .with_inner_size(PhysicalSize::new(settings.width, settings.height))
        .with_position(PhysicalPosition::new(settings.x, settings.y));
    if let Some(icon) = load_icon(&config.paths.icon) {
        builder = builder.with_window_icon(Some(icon));
    }
    let window = builder.build(event_loop).map_err(native)?;

    let mut context = WebContext::new(Some(config.paths.cache_dir.clone()));
    let webview = build_webview(
        WebViewBuilder::with_web_context(&mut context)
            .with_url("about:blank")
            .with_focused(true)
            .with_on_page_load_handler(|event, url| {
                tracing::debug!(?event, %url, "Page load");
            }),
        &window,
    )?;
    watch_view_events(&webview, event_loop.create_proxy());

    tracing::info!(
        title = %settings.title,
        cache_dir = %config.paths.cache_dir.display(),
        "Window created"
    );

    Ok(Surface {
        window: TaoWindow {
            window: Some(window),
        },
        view: WryView {
            webview: Some(webview),
        },
        runtime: WryRuntime {
            context: Some(context),
        },
    })
}

#[cfg(not(target_os = "linux"))]
fn build_webview(builder: WebViewBuilder<'_>, window: &Window) -> Result<WebView, WindowError> {
    builder.build(window).map_err(view)
}

#[cfg(target_os = "linux")]
fn build_webview(builder: WebViewBuilder<'_>, window: &Window) -> Result<WebView, WindowError> {
    use tao::platform::unix::WindowExtUnix;
    use wry::WebViewBuilderExtUnix;

    let vbox = window
        .default_vbox()
        .ok_or_else(|| WindowError::Native("window has no GTK container".to_string()))?;
    builder.build_gtk(vbox).map_err(view)
}

/// Forwards load failures and web process crashes to the UI loop.
#[cfg(target_os = "linux")]
fn watch_view_events(webview: &WebView, proxy: EventLoopProxy<UiCommand>) {
    use kiosk_core::ViewEvent;
    use webkit2gtk::{NetworkError, WebViewExt};
    use wry::WebViewExtUnix;

    fn send_view_event(proxy: &EventLoopProxy<UiCommand>, event: ViewEvent) {
        if proxy.send_event(UiCommand::View(event)).is_err() {
            tracing::debug!("Event loop closed before view event");
        }
    }

    let inner = webview.webview();
    let failures = proxy.clone();
    inner.connect_load_failed(move |_, _, uri, error| {
        let cancelled = error.matches(NetworkError::Cancelled);
        if let Some(event) = load_failure(uri, cancelled, error.to_string()) {
            send_view_event(&failures, event);
        }
        false
    });
    inner.connect_web_process_terminated(move |_, reason| {
        tracing::error!(?reason, "Web process terminated");
        send_view_event(&proxy, ViewEvent::RuntimeTerminated);
    });
}

/// Superseded navigations are reported as cancelled loads and are not
/// failures.
#[cfg(target_os = "linux")]
fn load_failure(uri: &str, cancelled: bool, reason: String) -> Option<kiosk_core::ViewEvent> {
    (!cancelled).then(|| kiosk_core::ViewEvent::LoadFailed {
        url: uri.to_string(),
        reason,
    })
}

/// Only focus changes are observable on this platform; they arrive as
/// window events.
#[cfg(not(target_os = "linux"))]
fn watch_view_events(_webview: &WebView, _proxy: EventLoopProxy<UiCommand>) {
    tracing::debug!("Load failures are not reported by this webview backend");
}

/// Loads the window icon. A missing file is not an error.
fn load_icon(path: &Path) -> Option<Icon> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No window icon");
        return None;
    }

    let image = match image::open(path) {
        Ok(image) => image.to_rgba8(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to load window icon");
            return None;
        }
    };

    let (width, height) = image.dimensions();
    match Icon::from_rgba(image.into_raw(), width, height) {
        Ok(icon) => Some(icon),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create window icon from RGBA data");
            None
        }
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use kiosk_core::ViewEvent;

    #[test]
    fn test_cancelled_loads_are_not_failures() {
        let event = load_failure("file:///web/home/index.html", true, "cancelled".into());
        assert_eq!(event, None);
    }

    #[test]
    fn test_load_failure_carries_url_and_reason() {
        let event = load_failure("file:///web/missing.html", false, "not found".into());
        assert_eq!(
            event,
            Some(ViewEvent::LoadFailed {
                url: "file:///web/missing.html".to_string(),
                reason: "not found".to_string(),
            })
        );
    }
}
