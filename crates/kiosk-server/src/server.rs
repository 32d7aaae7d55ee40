//! Control server lifecycle.

use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::{create_router, AppState};
use crate::error::ServerError;

/// Default control server address.
pub const DEFAULT_ADDR: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 7070);

/// A bound but not yet serving control server.
pub struct ControlServer {
    listener: TcpListener,
    router: Router,
    local_addr: SocketAddr,
}

impl ControlServer {
    /// Binds the control server. Only loopback addresses are accepted.
    pub async fn bind(addr: SocketAddr, state: AppState) -> Result<Self, ServerError> {
        if !addr.ip().is_loopback() {
            return Err(ServerError::NonLoopback(addr));
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            router: create_router(state),
            local_addr,
        })
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts serving on the current tokio runtime.
    pub fn spawn(self) -> ServerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let addr = self.local_addr;

        let task = tokio::spawn(async move {
            tracing::info!(%addr, "Control server listening");
            axum::serve(self.listener, self.router)
                .with_graceful_shutdown(async {
                    // A dropped handle also stops the server.
                    let _ = shutdown_rx.await;
                })
                .await
                .map_err(ServerError::Serve)
        });

        ServerHandle {
            local_addr: addr,
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Handle to a running control server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), ServerError>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and waits for in-flight requests.
    pub async fn stop(mut self) -> Result<(), ServerError> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        let result = self
            .task
            .await
            .map_err(|e| ServerError::Task(e.to_string()))?;
        tracing::info!(addr = %self.local_addr, "Control server stopped");
        result
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}
