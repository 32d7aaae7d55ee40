//! Startup wiring and shutdown ordering.
//!
//! The coordinator owns the error log and the settings store, starts the
//! control server and hands the window surface to a [`WindowController`].
//! It never touches the window itself: everything that must happen on the
//! UI context goes through the [`UiDispatcher`] it was built with.

use kiosk_core::{
    ControllerOptions, DispatchError, EmbeddedView, ErrorLog, NativeWindow, PageResolver,
    SettingsStore, ShellControl, UiCommand, UiDispatcher, ViewRuntime, WindowController,
    WindowError,
};
use kiosk_server::{AppState, ControlServer, ServerError, ServerHandle};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::ShellConfig;
use crate::error::ShellError;

/// Terminates the process with the given exit code.
pub type ExitFn = Arc<dyn Fn(i32) + Send + Sync>;

fn exit_process(code: i32) {
    std::process::exit(code)
}

/// Owns the shell's shared state and sequences startup and shutdown.
pub struct ShellCoordinator {
    config: ShellConfig,
    errors: Arc<ErrorLog>,
    settings: Arc<SettingsStore>,
    resolver: Arc<PageResolver>,
    dispatcher: Arc<dyn UiDispatcher>,
    exit: ExitFn,
    server: Option<ServerHandle>,
}

impl ShellCoordinator {
    /// Opens the settings store and resolves the web root.
    pub fn new(config: ShellConfig, dispatcher: Arc<dyn UiDispatcher>) -> Result<Self, ShellError> {
        let resolver = PageResolver::new(&config.paths.web_root).map_err(|source| {
            ShellError::WebRoot {
                path: config.paths.web_root.clone(),
                source,
            }
        })?;

        let errors = Arc::new(ErrorLog::new());
        let settings = SettingsStore::open(&config.paths.settings_file, errors.clone())
            .with_dispatcher(dispatcher.clone());

        tracing::info!(
            web_root = %resolver.root().display(),
            settings = %config.paths.settings_file.display(),
            "Shell initialized"
        );

        Ok(Self {
            config,
            errors,
            settings: Arc::new(settings),
            resolver: Arc::new(resolver),
            dispatcher,
            exit: Arc::new(exit_process),
            server: None,
        })
    }

    /// Replaces the function used to terminate the process.
    pub fn with_exit(mut self, exit: ExitFn) -> Self {
        self.exit = exit;
        self
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn errors(&self) -> &Arc<ErrorLog> {
        &self.errors
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// Whether the window starts in fullscreen. An explicit override wins
    /// over the flag persisted in the settings file.
    pub fn boot_fullscreen(&self, override_flag: Option<bool>) -> bool {
        override_flag.unwrap_or_else(|| SettingsStore::boot_fullscreen(self.settings.path()))
    }

    /// Shell actions for the control server.
    pub fn handle(&self) -> ShellHandle {
        ShellHandle {
            dispatcher: self.dispatcher.clone(),
            errors: self.errors.clone(),
            exit: self.exit.clone(),
        }
    }

    /// Binds and starts the control server on the current tokio runtime.
    pub async fn start_server(&mut self) -> Result<SocketAddr, ShellError> {
        let state = AppState {
            errors: self.errors.clone(),
            settings: self.settings.clone(),
            shell: Arc::new(self.handle()),
            pages: Arc::new(self.config.pages.clone()),
            resolver: self.resolver.clone(),
        };

        let server = ControlServer::bind(self.config.server.addr, state).await?;
        let handle = server.spawn();
        let addr = handle.local_addr();
        self.server = Some(handle);
        Ok(addr)
    }

    /// Stops the control server if it is running.
    pub async fn stop_server(&mut self) -> Result<(), ServerError> {
        match self.server.take() {
            Some(server) => server.stop().await,
            None => Ok(()),
        }
    }

    /// Hands the window surface to a new controller.
    pub fn attach_window<W, V, R>(
        &self,
        window: W,
        view: V,
        runtime: R,
        start_fullscreen: bool,
    ) -> Result<WindowController<W, V, R>, WindowError>
    where
        W: NativeWindow,
        V: EmbeddedView,
        R: ViewRuntime,
    {
        let options = ControllerOptions {
            initial_bounds: self.config.window.bounds(),
            on_top_grace: self.config.window.on_top_grace(),
            pages: self.resolver.as_ref().clone(),
            error_page: self.config.pages.error.clone(),
        };

        WindowController::new(
            window,
            view,
            runtime,
            options,
            self.dispatcher.clone(),
            self.errors.clone(),
            start_fullscreen,
        )
    }

    /// Shows the loading page, then the home page once the splash delay
    /// has elapsed.
    pub fn begin_navigation(&self) -> Result<(), DispatchError> {
        let pages = &self.config.pages;
        self.dispatcher
            .dispatch(UiCommand::Navigate(pages.loading.clone()))?;
        // The home page is never cancelled, so the task handle is dropped.
        self.dispatcher
            .dispatch_after(self.config.splash(), UiCommand::Navigate(pages.home.clone()))?;
        Ok(())
    }
}

/// [`ShellControl`] backed by the UI dispatcher.
#[derive(Clone)]
pub struct ShellHandle {
    dispatcher: Arc<dyn UiDispatcher>,
    errors: Arc<ErrorLog>,
    exit: ExitFn,
}

impl ShellControl for ShellHandle {
    fn navigate(&self, page: &str) {
        if let Err(e) = self
            .dispatcher
            .dispatch(UiCommand::Navigate(page.to_string()))
        {
            tracing::warn!(page, error = %e, "Could not schedule navigation");
        }
    }

    fn show_errors(&self) {
        self.errors.notify_ui(self.dispatcher.as_ref());
    }

    /// Asks the UI loop to dispose the window and exit. The process is
    /// terminated directly only when the loop is already gone.
    fn terminate(&self) {
        tracing::info!("Terminating");
        if let Err(e) = self.dispatcher.dispatch(UiCommand::Shutdown) {
            tracing::warn!(error = %e, "UI loop unavailable, exiting directly");
            (self.exit)(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathsConfig;
    use kiosk_core::testing::{surface, RecordingDispatcher};
    use kiosk_core::{Bounds, WindowMode};
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::time::Duration;

    fn test_config(dir: &tempfile::TempDir) -> ShellConfig {
        ShellConfig {
            paths: PathsConfig {
                web_root: dir.path().to_path_buf(),
                settings_file: dir.path().join("kiosk_settings.json"),
                ..PathsConfig::default()
            },
            ..ShellConfig::default()
        }
    }

    fn coordinator(dir: &tempfile::TempDir) -> (ShellCoordinator, Arc<RecordingDispatcher>) {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let coordinator = ShellCoordinator::new(test_config(dir), dispatcher.clone()).unwrap();
        (coordinator, dispatcher)
    }

    #[test]
    fn test_new_persists_default_settings() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _) = coordinator(&dir);

        assert!(dir.path().join("kiosk_settings.json").exists());
        assert_eq!(coordinator.settings().current_theme(), "dark");
        assert!(coordinator.errors().is_empty());
    }

    #[test]
    fn test_boot_fullscreen_reads_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("kiosk_settings.json"),
            r#"{"theme": "dark", "fullscreen": true}"#,
        )
        .unwrap();
        let (coordinator, _) = coordinator(&dir);

        assert!(coordinator.boot_fullscreen(None));
        assert!(!coordinator.boot_fullscreen(Some(false)));
    }

    #[test]
    fn test_begin_navigation_shows_loading_then_home() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, dispatcher) = coordinator(&dir);

        coordinator.begin_navigation().unwrap();

        assert_eq!(
            dispatcher.commands(),
            vec![UiCommand::Navigate("/web/load/loading.html".to_string())]
        );
        let scheduled = dispatcher.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].delay, Duration::from_secs(1));
        assert_eq!(
            scheduled[0].command,
            UiCommand::Navigate("/web/home/index.html".to_string())
        );
    }

    #[test]
    fn test_settings_changes_reach_the_ui() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, dispatcher) = coordinator(&dir);

        coordinator.settings().toggle_fullscreen().unwrap();

        assert_eq!(dispatcher.commands(), vec![UiCommand::SetFullscreen(true)]);
    }

    #[test]
    fn test_attach_window_uses_configured_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _) = coordinator(&dir);
        let (probe, window, view, runtime) = surface();

        let controller = coordinator
            .attach_window(window, view, runtime, false)
            .unwrap();

        assert_eq!(controller.mode(), WindowMode::Windowed);
        assert_eq!(probe.bounds(), Bounds::new(100, 100, 1280, 720));
    }

    #[test]
    fn test_shell_handle_dispatches() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, dispatcher) = coordinator(&dir);
        let handle = coordinator.handle();

        handle.navigate("/web/home/index.html");
        handle.show_errors();

        assert_eq!(
            dispatcher.commands(),
            vec![
                UiCommand::Navigate("/web/home/index.html".to_string()),
                UiCommand::ShowErrors,
            ]
        );
    }

    fn recording_exit(coordinator: ShellCoordinator) -> (ShellCoordinator, Arc<AtomicI32>) {
        let exit_code = Arc::new(AtomicI32::new(-1));
        let recorded = exit_code.clone();
        let coordinator =
            coordinator.with_exit(Arc::new(move |code| recorded.store(code, Ordering::SeqCst)));
        (coordinator, exit_code)
    }

    #[test]
    fn test_terminate_shuts_down_through_ui_loop() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, dispatcher) = coordinator(&dir);
        let (coordinator, exit_code) = recording_exit(coordinator);

        coordinator.handle().terminate();

        assert_eq!(dispatcher.commands(), vec![UiCommand::Shutdown]);
        assert_eq!(exit_code.load(Ordering::SeqCst), -1);
    }

    #[test]
    fn test_terminate_exits_with_zero_without_ui_loop() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, dispatcher) = coordinator(&dir);
        let (coordinator, exit_code) = recording_exit(coordinator);
        dispatcher.close();

        coordinator.handle().terminate();

        assert!(dispatcher.commands().is_empty());
        assert_eq!(exit_code.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_server_start_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let mut config = test_config(&dir);
        config.server.addr = "127.0.0.1:0".parse().unwrap();
        let mut coordinator = ShellCoordinator::new(config, dispatcher).unwrap();

        let addr = coordinator.start_server().await.unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);

        coordinator.stop_server().await.unwrap();
        // Stopping twice is harmless.
        coordinator.stop_server().await.unwrap();
    }

    #[tokio::test]
    async fn test_non_loopback_server_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.server.addr = "0.0.0.0:7070".parse().unwrap();
        let mut coordinator =
            ShellCoordinator::new(config, Arc::new(RecordingDispatcher::new())).unwrap();

        let result = coordinator.start_server().await;
        assert!(matches!(
            result,
            Err(ShellError::Server(ServerError::NonLoopback(_)))
        ));
    }
}
