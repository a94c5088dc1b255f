//! Heartbeat service implementation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::HeartbeatConfig;
use crate::error::Result;
use crate::health::{HealthCheck, HealthRegistry, HealthStatus};

/// Name of the heartbeat entry in the [`HealthRegistry`].
pub const HEALTH_CHECK_NAME: &str = "heartbeat";

/// Structured result from a heartbeat tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResult {
    /// Unix timestamp of the tick.
    pub timestamp: u64,
    /// HTTP status of the ping, when a response arrived.
    pub status: Option<u16>,
    /// Round-trip time in milliseconds.
    pub latency_ms: u64,
    /// Error message if the tick failed.
    pub error: Option<String>,
}

impl HeartbeatResult {
    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    /// Construct a result for a ping that got an answer.
    pub fn answered(status: u16, latency_ms: u64) -> Self {
        let error = if (200..400).contains(&status) {
            None
        } else {
            Some(format!("unexpected status {}", status))
        };
        Self {
            timestamp: Self::now(),
            status: Some(status),
            latency_ms,
            error,
        }
    }

    /// Construct an error result.
    pub fn err(msg: &str, latency_ms: u64) -> Self {
        Self {
            timestamp: Self::now(),
            status: None,
            latency_ms,
            error: Some(msg.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Background service that periodically GETs the bot's own public URL so
/// the hosting platform does not put the instance to sleep.
pub struct HeartbeatService {
    url: String,
    interval: Duration,
    client: reqwest::Client,
    /// Count of consecutive failed ticks.
    pub(crate) consecutive_failures: Arc<AtomicU32>,
    /// Threshold before reporting the heartbeat as degraded.
    failure_alert_threshold: u32,
    health: Option<HealthRegistry>,
}

impl HeartbeatService {
    /// Create a new heartbeat service.
    pub fn new(url: &str, interval_secs: u64, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            url: url.to_string(),
            interval: Duration::from_secs(interval_secs.max(1)),
            client,
            consecutive_failures: Arc::new(AtomicU32::new(0)),
            failure_alert_threshold: 3,
            health: None,
        })
    }

    pub fn from_config(config: &HeartbeatConfig) -> Result<Self> {
        Self::new(&config.url, config.interval_secs, config.timeout_secs)
    }

    /// Report tick outcomes into `registry` under [`HEALTH_CHECK_NAME`].
    pub fn with_health(mut self, registry: HealthRegistry) -> Self {
        registry.register(HealthCheck::ok(HEALTH_CHECK_NAME));
        self.health = Some(registry);
        self
    }

    /// Ping immediately, returning a structured result.
    pub async fn trigger_now(&self) -> HeartbeatResult {
        let result = self.tick().await;
        self.record(&result);
        result
    }

    /// Returns the current count of consecutive failed ticks.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Ping every interval until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            component = "heartbeat",
            "Heartbeat service started (interval={}s, url={})",
            self.interval.as_secs(),
            self.url
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.trigger_now().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(component = "heartbeat", "Heartbeat service stopped");
    }

    fn record(&self, result: &HeartbeatResult) {
        if result.is_ok() {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            if let Some(health) = &self.health {
                health.update(HEALTH_CHECK_NAME, HealthStatus::Ok, None);
            }
            return;
        }

        let count = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if count >= self.failure_alert_threshold {
            warn!(
                component = "heartbeat",
                consecutive_failures = count,
                "Heartbeat: {} consecutive failures, host may go to sleep",
                count
            );
            if let Some(health) = &self.health {
                health.update(
                    HEALTH_CHECK_NAME,
                    HealthStatus::Degraded,
                    Some(format!("{} consecutive failed pings", count)),
                );
            }
        }
    }

    async fn tick(&self) -> HeartbeatResult {
        let started = Instant::now();
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let result = HeartbeatResult::answered(status, elapsed_ms(started));
                match &result.error {
                    None => debug!(component = "heartbeat", status, "Self-ping ok"),
                    Some(e) => warn!(component = "heartbeat", "Self-ping failed: {}", e),
                }
                result
            }
            Err(e) => {
                warn!(component = "heartbeat", "Self-ping failed: {}", e);
                HeartbeatResult::err(&e.to_string(), elapsed_ms(started))
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: 13\r\nConnection: close\r\n\r\nBot is alive!",
                status
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    fn closed_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/", addr)
    }

    #[test]
    fn test_heartbeat_result_answered() {
        let ok = HeartbeatResult::answered(200, 12);
        assert!(ok.is_ok());
        assert_eq!(ok.status, Some(200));
        assert!(ok.timestamp > 0);

        let bad = HeartbeatResult::answered(502, 5);
        assert!(!bad.is_ok());
        assert_eq!(bad.error.as_deref(), Some("unexpected status 502"));
    }

    #[test]
    fn test_heartbeat_result_json_serialization() {
        let result = HeartbeatResult::err("connection refused", 3);
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"status\":null"));
        let parsed: HeartbeatResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_ping_success_resets_failures() {
        let url = serve_once("200 OK").await;
        let service = HeartbeatService::new(&url, 600, 5).unwrap();
        service.consecutive_failures.store(2, Ordering::Relaxed);

        let result = service.trigger_now().await;
        assert!(result.is_ok());
        assert_eq!(service.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_ping_failure_is_counted_and_degrades_health() {
        let registry = HealthRegistry::new();
        let service = HeartbeatService::new(&closed_url(), 600, 2)
            .unwrap()
            .with_health(registry.clone());

        for _ in 0..3 {
            let result = service.trigger_now().await;
            assert!(!result.is_ok());
            assert!(result.status.is_none());
        }
        assert_eq!(service.consecutive_failures(), 3);
        assert_eq!(
            registry.status(HEALTH_CHECK_NAME),
            Some(HealthStatus::Degraded)
        );
        assert!(registry.is_alive());
    }

    #[tokio::test]
    async fn test_error_status_counts_as_failure() {
        let url = serve_once("503 Service Unavailable").await;
        let service = HeartbeatService::new(&url, 600, 5).unwrap();
        let result = service.trigger_now().await;
        assert_eq!(result.status, Some(503));
        assert_eq!(service.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let service = HeartbeatService::new("http://127.0.0.1:9/", 3600, 1).unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(service.run(rx));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("heartbeat should stop")
            .unwrap();
    }
}
