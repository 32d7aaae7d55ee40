//! # Kiosk Desktop
//!
//! Single-window kiosk shell hosting a local web UI.
//!
//! ## Architecture
//!
//! The main thread runs the tao event loop and owns the window and its
//! webview through a `WindowController`. A tokio runtime serves the local
//! control server; request handlers reach the window only by sending
//! `UiCommand`s to the event loop.

use anyhow::Context;
use clap::Parser;
use kiosk_core::{ShellControl, UiCommand, UiFlow, ViewEvent, ViewEventSink};
use kiosk_shell::{LogFormat, Overrides, ShellConfig, ShellCoordinator};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tao::event::{Event, WindowEvent};
use tao::event_loop::{ControlFlow, EventLoopBuilder};

mod native;

use native::{build_surface, ProxyDispatcher};

/// Kiosk shell - full-screen host for a local web UI
#[derive(Parser, Debug)]
#[command(name = "kiosk")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to ./kiosk.yaml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Control server listen address (loopback only)
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Directory pages are resolved against
    #[arg(long)]
    web_root: Option<PathBuf>,

    /// Persisted settings file
    #[arg(long)]
    settings_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long)]
    log_format: Option<String>,

    /// Start fullscreen or windowed, ignoring the persisted flag
    #[arg(long)]
    fullscreen: Option<bool>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let overrides = Overrides {
        addr: args.addr,
        web_root: args.web_root,
        settings_file: args.settings_file,
        log_level: args.log_level,
        log_format: args.log_format.as_deref().map(LogFormat::parse),
    };
    let config = ShellConfig::load(args.config.as_deref(), &overrides)?;
    config.log.init()?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting kiosk shell");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let event_loop = EventLoopBuilder::<UiCommand>::with_user_event().build();
    let dispatcher = Arc::new(ProxyDispatcher::new(
        event_loop.create_proxy(),
        runtime.handle().clone(),
    ));

    let mut coordinator = ShellCoordinator::new(config, dispatcher)?;
    let addr = runtime.block_on(coordinator.start_server())?;
    tracing::info!(%addr, "Control server ready");

    let start_fullscreen = coordinator.boot_fullscreen(args.fullscreen);
    let surface = build_surface(&event_loop, coordinator.config())?;
    let mut controller =
        coordinator.attach_window(surface.window, surface.view, surface.runtime, start_fullscreen)?;
    coordinator.begin_navigation()?;

    let shell = coordinator.handle();
    runtime.spawn(async move {
        shutdown_signal().await;
        shell.terminate();
    });

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Wait;

        let flow = match event {
            Event::UserEvent(command) => controller.handle(command),
            Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                ..
            } => {
                // Stop the server before the window is disposed.
                if let Err(e) = runtime.block_on(coordinator.stop_server()) {
                    tracing::warn!(error = %e, "Control server did not stop cleanly");
                }
                controller.handle(UiCommand::Shutdown)
            }
            Event::WindowEvent {
                event: WindowEvent::Focused(focused),
                ..
            } => controller.on_view_event(if focused {
                ViewEvent::GotFocus
            } else {
                ViewEvent::TookFocus
            }),
            _ => UiFlow::Continue,
        };

        if flow == UiFlow::Exit {
            if let Err(e) = runtime.block_on(coordinator.stop_server()) {
                tracing::warn!(error = %e, "Control server did not stop cleanly");
            }
            tracing::info!("Kiosk shell stopped");
            *control_flow = ControlFlow::Exit;
        }
    })
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C"),
            Err(e) => {
                tracing::warn!(error = %e, "Ctrl+C handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM");
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
