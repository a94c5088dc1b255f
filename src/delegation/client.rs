//! Tool-building service client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::protocol::{RawToolResponse, ToolProtocol, ToolResponse};
use crate::config::DelegationConfig;
use crate::error::{AilexError, Result};

/// External service that builds or finds tools on a user's behalf.
///
/// Errors mean the exchange itself failed (transport, bad status,
/// unreadable body); a service-level failure arrives as
/// `Ok(ToolResponse::Error(..))`.
#[async_trait]
pub trait ToolService: Send + Sync {
    /// Open a new delegation with the user's first request.
    async fn start(&self, user_id: &str, text: &str) -> Result<ToolResponse>;

    /// Forward a follow-up message in an open delegation.
    async fn continue_session(&self, user_id: &str, text: &str) -> Result<ToolResponse>;
}

#[derive(Debug, Serialize)]
struct ToolRequest<'a> {
    user_id: &'a str,
    message: &'a str,
}

/// JSON-over-HTTP tool service.
///
/// `start` posts to `{base_url}{start_path}`, `continue_session` to
/// `{base_url}{continue_path}`; both send `{"user_id", "message"}`.
pub struct HttpToolService {
    base_url: String,
    start_path: String,
    continue_path: String,
    protocol: ToolProtocol,
    client: Client,
}

impl HttpToolService {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| AilexError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            start_path: "/start".to_string(),
            continue_path: "/continue".to_string(),
            protocol: ToolProtocol::default(),
            client,
        })
    }

    /// Build a client from the `delegation` config section.
    pub fn from_config(config: &DelegationConfig) -> Result<Self> {
        let mut service = Self::new(&config.base_url, config.timeout_secs)?;
        service.start_path = config.start_path.clone();
        service.continue_path = config.continue_path.clone();
        service.protocol = config.protocol.clone();
        Ok(service)
    }

    /// Override the status tag mapping (builder pattern).
    pub fn with_protocol(mut self, protocol: ToolProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    async fn call(&self, path: &str, user_id: &str, text: &str) -> Result<ToolResponse> {
        let url = format!("{}{}", self.base_url, path);
        debug!(component = "delegation", url = %url, user_id = %user_id, "Calling tool service");

        let response = self
            .client
            .post(&url)
            .json(&ToolRequest {
                user_id,
                message: text,
            })
            .send()
            .await
            .map_err(|e| AilexError::ToolService(format!("POST {} failed: {}", url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AilexError::ToolService(format!("reading {} failed: {}", url, e)))?;

        if !status.is_success() {
            return Err(AilexError::ToolService(format!(
                "{} answered with HTTP {}: {}",
                url, status, body
            )));
        }

        let raw: RawToolResponse = serde_json::from_str(&body).map_err(|e| {
            AilexError::ToolService(format!("undecodable response from {}: {}", url, e))
        })?;
        Ok(self.protocol.decode(raw))
    }
}

#[async_trait]
impl ToolService for HttpToolService {
    async fn start(&self, user_id: &str, text: &str) -> Result<ToolResponse> {
        self.call(&self.start_path, user_id, text).await
    }

    async fn continue_session(&self, user_id: &str, text: &str) -> Result<ToolResponse> {
        self.call(&self.continue_path, user_id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    async fn serve_once(status: u16, body: &'static str) -> (String, Arc<Mutex<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let captured = Arc::new(Mutex::new(String::new()));
        let captured_clone = Arc::clone(&captured);

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(idx) = text.find("\r\n\r\n") {
                    let len = text
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if raw.len() >= idx + 4 + len {
                        break;
                    }
                }
            }
            *captured_clone.lock().await = String::from_utf8_lossy(&raw).to_string();
            let response = format!(
                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;
        });

        (format!("http://{}", addr), captured)
    }

    #[tokio::test]
    async fn test_start_posts_user_and_message() {
        let (base, captured) = serve_once(200, r#"{"status":"ask","message":"which format?"}"#).await;
        let service = HttpToolService::new(&base, 5).unwrap();

        let response = service.start("42", "build me a tool").await.unwrap();
        assert_eq!(response, ToolResponse::Ask("which format?".to_string()));

        let request = captured.lock().await.clone();
        assert!(request.starts_with("POST /start "));
        assert!(request.contains(r#""user_id":"42""#));
        assert!(request.contains(r#""message":"build me a tool""#));
    }

    #[tokio::test]
    async fn test_continue_uses_continue_path() {
        let (base, captured) = serve_once(200, r#"{"status":"result","result":"done!"}"#).await;
        let service = HttpToolService::new(&base, 5).unwrap();

        let response = service.continue_session("42", "PDF").await.unwrap();
        assert_eq!(response, ToolResponse::Result("done!".to_string()));
        assert!(captured.lock().await.starts_with("POST /continue "));
    }

    #[tokio::test]
    async fn test_http_error_status_is_err() {
        let (base, _) = serve_once(502, "bad gateway").await;
        let service = HttpToolService::new(&base, 5).unwrap();
        let err = service.start("1", "tool").await.unwrap_err();
        assert!(matches!(err, AilexError::ToolService(_)));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_err() {
        let (base, _) = serve_once(200, "<html></html>").await;
        let service = HttpToolService::new(&base, 5).unwrap();
        let err = service.start("1", "tool").await.unwrap_err();
        assert!(matches!(err, AilexError::ToolService(_)));
    }

    #[tokio::test]
    async fn test_transport_failure_is_err() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let service = HttpToolService::new(&format!("http://{}", addr), 2).unwrap();
        assert!(service.start("1", "tool").await.is_err());
    }
}
