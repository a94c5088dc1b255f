//! Periodic idle-session eviction.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info};

use super::SessionStore;

/// Default sweep interval.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Background task that sweeps idle sessions out of a [`SessionStore`].
pub struct SessionEvictor {
    store: Arc<SessionStore>,
    interval: Duration,
}

impl SessionEvictor {
    pub fn new(store: Arc<SessionStore>, interval_secs: u64) -> Self {
        Self {
            store,
            interval: Duration::from_secs(interval_secs.max(1)),
        }
    }

    /// Run a single sweep against the current time.
    pub async fn sweep_once(&self) -> Vec<String> {
        let evicted = self.store.sweep(Utc::now()).await;
        if evicted.is_empty() {
            debug!(component = "sessions", "Sweep: no idle sessions");
        } else {
            info!(
                component = "sessions",
                evicted = evicted.len(),
                "Evicted idle sessions: {}",
                evicted.join(", ")
            );
        }
        evicted
    }

    /// Sweep every interval until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            component = "sessions",
            "Session evictor started (interval={}s, idle_timeout={}s)",
            self.interval.as_secs(),
            self.store.idle_timeout().num_seconds()
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.sweep_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(component = "sessions", "Session evictor stopped");
    }
}
