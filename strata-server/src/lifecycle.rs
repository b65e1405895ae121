//! Shared lifecycle state: server status, in-flight connections and the
//! readiness flag. Read by the HTTP layer, driven by [`crate::server::Server`].

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{watch, Notify};
use tracing::{debug, info};

/// Status of the server.
///
/// `Stopped -> Starting -> Running -> ShuttingDown -> Stopped`. A server that
/// never started may go from `Starting` straight to shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
    ShuttingDown,
}

impl ServerStatus {
    /// Numeric code reported on health/metrics surfaces.
    pub fn code(&self) -> u8 {
        match self {
            ServerStatus::Stopped => 0,
            ServerStatus::Starting => 1,
            ServerStatus::Running => 2,
            ServerStatus::ShuttingDown => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Stopped => "stopped",
            ServerStatus::Starting => "starting",
            ServerStatus::Running => "running",
            ServerStatus::ShuttingDown => "shutting_down",
        }
    }

    fn can_transition_to(&self, next: ServerStatus) -> bool {
        use ServerStatus::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, ShuttingDown)
                | (Running, ShuttingDown)
                | (Starting, Stopped)
                | (Running, Stopped)
                | (ShuttingDown, Stopped)
        )
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Count of requests currently being processed.
///
/// Never goes below zero: surplus decrements are absorbed.
#[derive(Debug, Default)]
pub struct ConnectionCounter {
    active: AtomicUsize,
    idle: Notify,
}

impl ConnectionCounter {
    pub fn increment(&self) -> usize {
        self.active.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn decrement(&self) -> usize {
        let previous = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);

        if previous == 0 {
            debug!("Connection counter already at zero, ignoring decrement");
        }

        let now = previous.saturating_sub(1);
        if now == 0 {
            self.idle.notify_waiters();
        }
        now
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Resolves once no request is in flight.
    pub async fn drained(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// State shared between the server and its request handlers.
#[derive(Debug)]
pub struct Lifecycle {
    status: watch::Sender<ServerStatus>,
    connections: ConnectionCounter,
    healthy: AtomicBool,
    started_at: Instant,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (status, _) = watch::channel(ServerStatus::Stopped);
        Self {
            status,
            connections: ConnectionCounter::default(),
            healthy: AtomicBool::new(false),
            started_at: Instant::now(),
        }
    }

    pub fn status(&self) -> ServerStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServerStatus> {
        self.status.subscribe()
    }

    /// Move to `next` if the state machine allows it. Returns whether the
    /// status changed.
    pub fn transition(&self, next: ServerStatus) -> bool {
        let mut from = next;
        let changed = self.status.send_if_modified(|current| {
            from = *current;
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });

        if changed {
            info!("Server status {} -> {}", from, next);
        } else if from != next {
            debug!("Ignoring status transition {} -> {}", from, next);
        }
        changed
    }

    pub fn connections(&self) -> &ConnectionCounter {
        &self.connections
    }

    pub fn set_health(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
