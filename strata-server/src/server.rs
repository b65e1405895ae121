//! Server lifecycle management.
//!
//! [`Server`] owns the HTTP listener and the storage handle. It moves through
//! [`ServerStatus`] as it starts and stops, tracks in-flight requests, and
//! drives an idempotent shutdown that always releases storage, even when
//! the drain deadline expires.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use strata_common::{Error, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::lifecycle::{Lifecycle, ServerStatus};
use crate::metrics::Metrics;
use crate::routes::{self, AppState};
use crate::storage::{FileStorage, PointWriter};

/// Bounds how long a shutdown may wait.
///
/// Carries an optional deadline and an optional cancellation signal; a
/// context with neither waits as long as it takes.
#[derive(Debug, Clone, Default)]
pub struct ShutdownContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Cancels the [`ShutdownContext`] it was created with.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextEnd {
    DeadlineExceeded,
    Cancelled,
}

impl ContextEnd {
    fn into_error(self, message: &str) -> Error {
        let reason = match self {
            ContextEnd::DeadlineExceeded => "deadline exceeded",
            ContextEnd::Cancelled => "cancelled",
        };
        Error::timeout(format!("{}: {}", message, reason)).with_context("reason", reason)
    }
}

impl ShutdownContext {
    /// No deadline, no cancellation.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: None,
        }
    }

    /// Attach a cancellation signal to this context.
    pub fn cancellable(self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            cancel: Some(rx),
            ..self
        };
        (ctx, CancelHandle(tx))
    }

    /// Resolves when the deadline passes or the context is cancelled.
    async fn done(&self) -> ContextEnd {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        let cancelled = async {
            let Some(rx) = &self.cancel else {
                return std::future::pending().await;
            };
            let mut rx = rx.clone();
            if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                // Handle dropped without cancelling
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = deadline => ContextEnd::DeadlineExceeded,
            _ = cancelled => ContextEnd::Cancelled,
        }
    }
}

/// HTTP ingestion server
pub struct Server {
    config: Config,
    lifecycle: Arc<Lifecycle>,
    storage: Mutex<Option<Arc<dyn PointWriter>>>,
    router: Router,
    stop_accepting: watch::Sender<bool>,
    /// Set once a shutdown has run to completion.
    shutdown_done: tokio::sync::Mutex<bool>,
}

impl Server {
    /// Validate the configuration, open storage and build the handler graph.
    pub async fn new(config: Option<Config>) -> Result<Self> {
        let config = config.ok_or_else(|| Error::validation("server configuration is required"))?;
        config.validate()?;

        let storage = FileStorage::open(config.storage.clone())
            .await
            .map_err(|e| Error::from(e).with_context("path", config.storage.path.display()))?;

        Ok(Self::with_storage(
            config,
            Arc::new(storage),
            Arc::new(Metrics::new()),
        ))
    }

    /// Build a server around an existing storage backend and metrics registry.
    pub fn with_storage(config: Config, storage: Arc<dyn PointWriter>, metrics: Arc<Metrics>) -> Self {
        let lifecycle = Arc::new(Lifecycle::new());

        let state = AppState {
            storage: storage.clone(),
            recorder: metrics.clone(),
            metrics,
            lifecycle: lifecycle.clone(),
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            max_body_bytes: config.max_body_bytes,
        };
        let router = routes::router(state);

        let (stop_accepting, _) = watch::channel(false);
        lifecycle.transition(ServerStatus::Starting);

        Self {
            config,
            lifecycle,
            storage: Mutex::new(Some(storage)),
            router,
            stop_accepting,
            shutdown_done: tokio::sync::Mutex::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The router, for driving the handlers without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    pub fn status(&self) -> ServerStatus {
        self.lifecycle.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ServerStatus> {
        self.lifecycle.subscribe()
    }

    pub fn set_health(&self, healthy: bool) {
        self.lifecycle.set_health(healthy);
    }

    pub fn is_healthy(&self) -> bool {
        self.lifecycle.is_healthy()
    }

    pub fn increment_connection(&self) -> usize {
        self.lifecycle.connections().increment()
    }

    pub fn decrement_connection(&self) -> usize {
        self.lifecycle.connections().decrement()
    }

    pub fn active_connections(&self) -> usize {
        self.lifecycle.connections().active()
    }

    /// Bind the configured address and serve until shut down.
    pub async fn start(&self) -> Result<()> {
        let addr = self.config.server_addr();
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            Error::network(format!("failed to bind {}", addr))
                .with_context("addr", &addr)
                .with_source(e)
        })?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener. Returns once the listener has
    /// stopped after a shutdown, or with an error if serving failed.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        if !self.lifecycle.transition(ServerStatus::Running) {
            return Err(Error::validation(format!(
                "cannot serve while server is {}",
                self.status()
            )));
        }
        self.set_health(true);

        match listener.local_addr() {
            Ok(addr) => info!("Listening on {}", addr),
            Err(e) => warn!("Listening on unknown address: {}", e),
        }
        debug!(
            read_timeout = ?self.config.read_timeout,
            write_timeout = ?self.config.write_timeout,
            idle_timeout = ?self.config.idle_timeout,
            "Request timeouts"
        );

        let mut stop = self.stop_accepting.subscribe();
        let result = axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(async move {
                let _ = stop.wait_for(|stop| *stop).await;
            })
            .await;

        match result {
            Ok(()) => {
                info!("HTTP listener stopped");
                Ok(())
            }
            Err(e) => {
                error!("HTTP server error: {}", e);
                self.set_health(false);
                Err(Error::network("HTTP server failed").with_source(e))
            }
        }
    }

    /// Stop accepting connections, wait for in-flight requests to drain
    /// (bounded by `ctx`), then close storage.
    ///
    /// Storage is closed and the status reaches `stopped` even when `ctx`
    /// expires first; the expiry is still reported as a timeout error.
    /// Safe to call repeatedly and from concurrent tasks.
    pub async fn shutdown(&self, ctx: Option<ShutdownContext>) -> Result<()> {
        let Some(ctx) = ctx else {
            return Err(Error::validation("shutdown context is required"));
        };

        // Only a caller queued behind another shutdown may give up on `ctx`.
        let mut done = tokio::select! {
            biased;
            guard = self.shutdown_done.lock() => guard,
            end = ctx.done() => {
                return Err(end.into_error("shutdown gave up waiting for a concurrent shutdown"));
            }
        };

        if *done {
            debug!("Shutdown already complete");
            return Ok(());
        }

        self.lifecycle.transition(ServerStatus::ShuttingDown);
        self.set_health(false);
        self.stop_accepting.send_replace(true);
        info!(
            "Shutting down with {} requests in flight",
            self.active_connections()
        );

        let drained = tokio::select! {
            biased;
            _ = self.lifecycle.connections().drained() => Ok(()),
            end = ctx.done() => Err(end
                .into_error("shutdown stopped waiting for in-flight requests")
                .with_context("active_connections", self.active_connections())),
        };

        self.close_storage().await;
        self.lifecycle.transition(ServerStatus::Stopped);
        *done = true;

        match &drained {
            Ok(()) => info!("Shutdown complete"),
            Err(e) => warn!("Shutdown completed without full drain: {}", e),
        }
        drained
    }

    /// Best-effort shutdown without a deadline. Always leaves the server
    /// `stopped`.
    pub async fn close(&self) {
        if let Err(e) = self.shutdown(Some(ShutdownContext::background())).await {
            warn!("Close finished with error: {}", e);
        }
        self.lifecycle.transition(ServerStatus::Stopped);
    }

    async fn close_storage(&self) {
        let storage = self
            .storage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let Some(storage) = storage else {
            debug!("No storage to close");
            return;
        };

        if let Err(e) = storage.close().await {
            error!("Failed to close storage: {}", e);
        }
    }
}
