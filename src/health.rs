//! Liveness server for AIlex.
//!
//! Hosting platforms that put idle web services to sleep probe `/`; the
//! bot answers `Bot is alive!` there and a JSON status on `/health`.
//! Background services report into a shared [`HealthRegistry`].
//!
//! Uses raw TCP + manual HTTP to avoid adding a web framework dependency.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::HealthConfig;
use crate::error::Result;

/// Body served on `/`.
pub const ALIVE_BODY: &str = "Bot is alive!";

const READ_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// HealthStatus
// ============================================================================

/// The status of a single named health component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is operating normally.
    Ok,
    /// Component keeps running but its recent work failed.
    Degraded,
    /// Component is fully unavailable.
    Down,
}

/// A named health check entry managed by [`HealthRegistry`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    /// Unique name for this check (e.g. "telegram", "scheduler").
    #[serde(skip)]
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthCheck {
    pub fn ok(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: HealthStatus::Ok,
            message: None,
        }
    }
}

#[derive(Serialize)]
struct HealthReport<'a> {
    status: &'static str,
    uptime_secs: u64,
    checks: &'a HashMap<String, HealthCheck>,
}

// ============================================================================
// HealthRegistry
// ============================================================================

/// Registry of named component health checks.
///
/// # Example
/// ```
/// use ailex::health::{HealthCheck, HealthRegistry, HealthStatus};
/// let registry = HealthRegistry::new();
/// registry.register(HealthCheck::ok("scheduler"));
/// registry.update("scheduler", HealthStatus::Degraded, Some("3 failed cycles".into()));
/// assert!(registry.is_alive());
/// ```
#[derive(Clone)]
pub struct HealthRegistry {
    checks: Arc<RwLock<HashMap<String, HealthCheck>>>,
    start_time: Instant,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            checks: Arc::new(RwLock::new(HashMap::new())),
            start_time: Instant::now(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, HealthCheck>> {
        self.checks.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, HealthCheck>> {
        self.checks.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new named check. Replaces any existing check with the same name.
    pub fn register(&self, check: HealthCheck) {
        self.write().insert(check.name.clone(), check);
    }

    /// Update an existing check's status and message.
    ///
    /// No-op if no check with that name is registered.
    pub fn update(&self, name: &str, status: HealthStatus, message: Option<String>) {
        if let Some(check) = self.write().get_mut(name) {
            check.status = status;
            check.message = message;
        }
    }

    /// Current status of one check.
    pub fn status(&self, name: &str) -> Option<HealthStatus> {
        self.read().get(name).map(|c| c.status)
    }

    /// The "is alive" query: `true` while no registered component is down.
    ///
    /// Reads only; never changes any state.
    pub fn is_alive(&self) -> bool {
        self.read().values().all(|c| c.status != HealthStatus::Down)
    }

    /// Elapsed time since the registry was created (proxy for process uptime).
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// JSON body for `/health`.
    pub fn render_json(&self) -> String {
        let checks = self.read();
        let degraded = checks.values().any(|c| c.status != HealthStatus::Ok);
        let report = HealthReport {
            status: match (self.is_alive_locked(&checks), degraded) {
                (false, _) => "down",
                (true, true) => "degraded",
                (true, false) => "ok",
            },
            uptime_secs: self.uptime().as_secs(),
            checks: &checks,
        };
        serde_json::to_string(&report).unwrap_or_else(|_| "{\"status\":\"ok\"}".to_string())
    }

    fn is_alive_locked(&self, checks: &HashMap<String, HealthCheck>) -> bool {
        checks.values().all(|c| c.status != HealthStatus::Down)
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Health server
// ============================================================================

/// Bind the liveness listener configured in `config`.
pub async fn bind(config: &HealthConfig) -> Result<TcpListener> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Health server listening on http://{}", addr);
    Ok(listener)
}

/// Serve liveness requests until `shutdown` flips to `true`.
///
/// - `GET /` → 200 `Bot is alive!`
/// - `GET /health` → 200 (503 when a component is down) with a JSON report
/// - Anything else → 404
pub async fn serve(
    listener: TcpListener,
    registry: HealthRegistry,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    let registry = registry.clone();
                    tokio::spawn(handle_connection(stream, registry));
                }
                Err(e) => {
                    warn!(error = %e, "Health server accept error");
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("Health server stopping");
                    break;
                }
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, registry: HealthRegistry) {
    let mut buf = [0u8; 512];
    let n = match tokio::time::timeout(READ_TIMEOUT, stream.read(&mut buf)).await {
        Ok(Ok(n)) => n,
        _ => return,
    };

    let request = String::from_utf8_lossy(&buf[..n]);
    let request_line = request.lines().next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let raw_path = parts.next().unwrap_or_default();
    let path = raw_path.split('?').next().unwrap_or(raw_path);

    let (status_line, content_type, body) = route(method, path, &registry);
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        content_type,
        body.len(),
        body
    );

    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn route(
    method: &str,
    path: &str,
    registry: &HealthRegistry,
) -> (&'static str, &'static str, String) {
    match (method, path) {
        ("GET", "/") | ("HEAD", "/") => ("200 OK", "text/plain; charset=utf-8", ALIVE_BODY.into()),
        ("GET", "/health") => {
            let status = if registry.is_alive() {
                "200 OK"
            } else {
                "503 Service Unavailable"
            };
            (status, "application/json", registry.render_json())
        }
        _ => (
            "404 Not Found",
            "application/json",
            "{\"error\":\"not_found\"}".to_string(),
        ),
    }
}

// ============================================================================
// Tests
// ============================================================================
