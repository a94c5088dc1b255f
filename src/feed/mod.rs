//! Feed module - headline source for the content scheduler
//!
//! A [`FeedFetcher`] turns a remote syndication feed into an ordered list of
//! headline strings. Fetchers never fail: any transport, status or parse
//! problem is logged and reported as an empty list.

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::error::{AilexError, Result};

/// Default feed source.
pub const DEFAULT_FEED_URL: &str = "https://habr.com/ru/rss/";

/// Source of candidate post topics.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Headlines in document order; empty on any failure.
    async fn fetch_titles(&self) -> Vec<String>;
}

/// RSS 2.0 fetcher returning the titles of `<item>` elements.
pub struct RssFeedFetcher {
    url: String,
    client: Client,
}

impl RssFeedFetcher {
    /// Create a fetcher for `url` with a bounded request timeout.
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| AilexError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    /// Create a fetcher from the `feed` config section.
    pub fn from_config(config: &FeedConfig) -> Result<Self> {
        Self::new(&config.url, config.timeout_secs)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn download(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AilexError::Feed(format!("request to {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AilexError::Feed(format!(
                "{} answered with HTTP {}",
                self.url, status
            )));
        }

        response
            .text()
            .await
            .map_err(|e| AilexError::Feed(format!("reading body of {} failed: {}", self.url, e)))
    }
}

#[async_trait]
impl FeedFetcher for RssFeedFetcher {
    async fn fetch_titles(&self) -> Vec<String> {
        match self.download().await {
            Ok(body) => {
                let titles = parse_rss_titles(&body);
                info!(component = "feed", count = titles.len(), "Fetched feed headlines");
                titles
            }
            Err(e) => {
                warn!(component = "feed", "Feed fetch failed: {}", e);
                Vec::new()
            }
        }
    }
}

/// Extract the text of every `<item><title>` in document order.
///
/// Entity and character references are resolved and CDATA sections are
/// included. Parsing stops at the first XML error, returning what was
/// collected so far. Blank titles are skipped.
///
/// # Example
/// ```
/// use ailex::feed::parse_rss_titles;
///
/// let xml = "<rss><channel><title>Feed</title>\
///            <item><title>First &amp; best</title></item>\
///            <item><title><![CDATA[Second]]></title></item>\
///            </channel></rss>";
/// assert_eq!(parse_rss_titles(xml), vec!["First & best", "Second"]);
/// ```
pub fn parse_rss_titles(xml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    let mut titles = Vec::new();
    let mut item_depth = 0usize;
    let mut current: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"item" => item_depth += 1,
                b"title" if item_depth > 0 => current = Some(String::new()),
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"item" => item_depth = item_depth.saturating_sub(1),
                b"title" => {
                    if let Some(title) = current.take() {
                        let title = title.trim();
                        if !title.is_empty() {
                            titles.push(title.to_string());
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if let Some(buf) = current.as_mut() {
                    if let Ok(text) = t.decode() {
                        buf.push_str(&text);
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(buf) = current.as_mut() {
                    if let Ok(text) = c.decode() {
                        buf.push_str(&text);
                    }
                }
            }
            Ok(Event::GeneralRef(r)) => {
                if let Some(buf) = current.as_mut() {
                    if let Ok(Some(ch)) = r.resolve_char_ref() {
                        buf.push(ch);
                    } else if let Ok(name) = r.decode() {
                        if let Some(resolved) = quick_xml::escape::resolve_predefined_entity(&name)
                        {
                            buf.push_str(resolved);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(
                    component = "feed",
                    position = reader.buffer_position(),
                    "Stopping feed parse at XML error: {}",
                    e
                );
                break;
            }
        }
    }

    titles
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Хабр</title>
    <item>
      <title><![CDATA[Как мы ускорили сборку в 3 раза]]></title>
      <link>https://habr.com/1</link>
    </item>
    <item>
      <title>Rust &amp; async: итоги года</title>
    </item>
    <item>
      <title>   </title>
    </item>
    <item>
      <title>Нейросети &#8212; обзор</title>
    </item>
  </channel>
</rss>"#;

    async fn serve_once(status: u16, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {} X\r\nContent-Type: application/rss+xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;
        });
        format!("http://{}/rss/", addr)
    }

    #[test]
    fn test_parse_titles_in_document_order() {
        let titles = parse_rss_titles(SAMPLE);
        assert_eq!(
            titles,
            vec![
                "Как мы ускорили сборку в 3 раза",
                "Rust & async: итоги года",
                "Нейросети — обзор",
            ]
        );
    }

    #[test]
    fn test_channel_title_is_not_a_headline() {
        let titles = parse_rss_titles(SAMPLE);
        assert!(!titles.iter().any(|t| t == "Хабр"));
    }

    #[test]
    fn test_parse_garbage_returns_empty() {
        assert!(parse_rss_titles("not xml at all").is_empty());
        assert!(parse_rss_titles("").is_empty());
    }

    #[test]
    fn test_parse_truncated_keeps_collected() {
        let xml = "<rss><channel><item><title>One</title></item><item><title>Two</ti";
        assert_eq!(parse_rss_titles(xml), vec!["One"]);
    }

    #[tokio::test]
    async fn test_fetch_titles_success() {
        let url = serve_once(200, SAMPLE).await;
        let fetcher = RssFeedFetcher::new(&url, 5).unwrap();
        assert_eq!(fetcher.fetch_titles().await.len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_titles_non_success_is_empty() {
        let url = serve_once(503, "down").await;
        let fetcher = RssFeedFetcher::new(&url, 5).unwrap();
        assert!(fetcher.fetch_titles().await.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_titles_transport_failure_is_empty() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = RssFeedFetcher::new(&format!("http://{}/rss/", addr), 2).unwrap();
        assert!(fetcher.fetch_titles().await.is_empty());
    }
}
