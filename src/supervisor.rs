//! Background task supervision.
//!
//! Every long-running service (dispatcher, scheduler, evictor, heartbeat,
//! liveness server) is spawned through a [`Supervisor`]. They all watch the
//! same shutdown flag and stop at their next wait point. A task that panics
//! is reported without taking the others down.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How a supervised task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Returned normally.
    Finished,
    /// Panicked; the panic was contained by the runtime.
    Panicked,
    /// Did not stop within the grace period and was aborted.
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub name: String,
    pub outcome: TaskOutcome,
}

/// Owns the shutdown flag and the handles of the spawned services.
pub struct Supervisor {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Supervisor {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    /// A receiver for the shutdown flag, to hand to a service's `run`.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Spawn a named service.
    pub fn spawn<F>(&mut self, name: &str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(task = name, "Starting background task");
        self.tasks.push((name.to_string(), tokio::spawn(task)));
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Flip the shutdown flag.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Signal shutdown and wait up to `grace` for each task.
    pub async fn stop(self, grace: Duration) -> Vec<TaskReport> {
        self.shutdown();
        let mut reports = Vec::with_capacity(self.tasks.len());
        for (name, mut handle) in self.tasks {
            let outcome = match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => TaskOutcome::Finished,
                Ok(Err(e)) if e.is_panic() => {
                    error!(task = %name, "Background task panicked");
                    TaskOutcome::Panicked
                }
                Ok(Err(_)) => TaskOutcome::Aborted,
                Err(_) => {
                    warn!(task = %name, "Background task did not stop in time, aborting");
                    handle.abort();
                    TaskOutcome::Aborted
                }
            };
            reports.push(TaskReport { name, outcome });
        }
        reports
    }

    /// Run until `signal` resolves, then stop every task.
    pub async fn run_until<S>(self, signal: S, grace: Duration) -> Vec<TaskReport>
    where
        S: Future<Output = ()>,
    {
        signal.await;
        info!("Shutdown requested");
        self.stop(grace).await
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves on Ctrl+C, or on SIGTERM where the platform has it.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
