//! Graceful shutdown with connection draining
//!
//! Once draining starts the accept loop stops, new connections are refused
//! and the server waits up to the configured timeout for open connections
//! to finish their in-flight requests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

struct DrainState {
    draining: AtomicBool,
    active_connections: AtomicUsize,
    /// Signalled when the last connection closes
    idle: Notify,
    /// Flips to `true` when draining starts
    stop_tx: watch::Sender<bool>,
}

/// Tracks open connections and broadcasts the start of shutdown
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<DrainState>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(timeout: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(DrainState {
                draining: AtomicBool::new(false),
                active_connections: AtomicUsize::new(0),
                idle: Notify::new(),
                stop_tx,
            }),
            timeout,
        }
    }

    /// Register a connection; `None` once draining has started
    pub fn connection_guard(&self) -> Option<ConnectionGuard> {
        if self.is_draining() {
            return None;
        }
        self.inner.active_connections.fetch_add(1, Ordering::SeqCst);
        Some(ConnectionGuard {
            state: self.inner.clone(),
        })
    }

    pub fn active_connections(&self) -> usize {
        self.inner.active_connections.load(Ordering::SeqCst)
    }

    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::SeqCst)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolves when draining starts
    pub fn stopped(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.inner.stop_tx.subscribe();
        async move {
            // An error means the coordinator is gone, which is also a stop
            let _ = rx.wait_for(|stopping| *stopping).await;
        }
    }

    /// Start draining and wait for open connections. Returns `false` when
    /// the timeout expired first.
    pub async fn drain(&self) -> bool {
        self.inner.draining.store(true, Ordering::SeqCst);
        self.inner.stop_tx.send_replace(true);

        info!(
            "Waiting for {} active connection(s) to drain",
            self.active_connections()
        );

        match tokio::time::timeout(self.timeout, self.wait_idle()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    "Drain timeout exceeded, {} connection(s) still open",
                    self.active_connections()
                );
                false
            }
        }
    }

    async fn wait_idle(&self) {
        loop {
            let idle = self.inner.idle.notified();
            let active = self.active_connections();
            if active == 0 {
                return;
            }
            debug!("Waiting for {} active connection(s)", active);
            idle.await;
        }
    }
}

/// Held for the lifetime of one connection
pub struct ConnectionGuard {
    state: Arc<DrainState>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let prev = self.state.active_connections.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            self.state.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_without_connections() {
        let shutdown = ShutdownCoordinator::new(Duration::from_millis(100));
        assert!(shutdown.drain().await);
        assert!(shutdown.is_draining());
        assert!(shutdown.connection_guard().is_none());
    }

    #[tokio::test]
    async fn test_drain_waits_for_connections() {
        let shutdown = ShutdownCoordinator::new(Duration::from_secs(5));
        let first = shutdown.connection_guard().unwrap();
        let second = shutdown.connection_guard().unwrap();
        assert_eq!(shutdown.active_connections(), 2);

        let stopped = shutdown.stopped();
        let drainer = shutdown.clone();
        let task = tokio::spawn(async move { drainer.drain().await });

        stopped.await;
        drop(first);
        drop(second);
        assert!(task.await.unwrap());
        assert_eq!(shutdown.active_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_timeout() {
        let shutdown = ShutdownCoordinator::new(Duration::from_millis(100));
        let _guard = shutdown.connection_guard().unwrap();
        assert!(!shutdown.drain().await);
    }
}
