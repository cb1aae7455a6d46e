//! Server module for running the echo server
//!
//! Provides the main server implementation with:
//! - Connection handling
//! - The assembled middleware chain and router
//! - Graceful shutdown with connection draining

mod app;
mod handler;
mod shutdown;

pub use app::App;
pub use handler::RequestHandler;
pub use shutdown::{ConnectionGuard, ShutdownCoordinator};

use crate::error::{MirageError, Result};
use crate::state::AppState;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, error, info, warn};

/// The Mirage server
pub struct Server {
    app: Arc<App>,
    listener: TcpListener,
    shutdown: ShutdownCoordinator,
}

impl Server {
    /// Bind the configured address. Port 0 picks a free port.
    pub async fn bind(state: AppState) -> Result<Self> {
        let address = state.config.server.listen_address();
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| MirageError::Config(format!("Invalid listen address {}: {}", address, e)))?;
        let listener = TcpListener::bind(addr).await?;
        let shutdown =
            ShutdownCoordinator::new(Duration::from_secs(state.config.server.shutdown_timeout_secs));

        info!(
            "Initializing Mirage server v{} on {}",
            crate::VERSION,
            listener.local_addr()?
        );

        Ok(Self {
            app: App::new(Arc::new(state)),
            listener,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// Serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<()> {
        self.run_until(wait_for_shutdown()).await
    }

    /// Serve until `signal` resolves, then drain open connections
    pub async fn run_until<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(signal);

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr),
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                }
                _ = &mut signal => {
                    info!("Initiating graceful shutdown...");
                    break;
                }
            }
        }

        drop(self.listener);
        if self.shutdown.drain().await {
            info!("All connections drained gracefully");
        } else {
            warn!("Some connections were forcefully closed");
        }

        info!("Mirage server stopped");
        Ok(())
    }

    fn spawn_connection(&self, stream: tokio::net::TcpStream, addr: SocketAddr) {
        let Some(guard) = self.shutdown.connection_guard() else {
            debug!("Rejecting connection from {} (server draining)", addr);
            return;
        };

        let handler = RequestHandler::new(self.app.clone());
        let stopped = self.shutdown.stopped();
        tokio::spawn(async move {
            let _guard = guard;
            handler.handle(stream, addr, stopped).await;
        });
    }
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
