//! Feed fetching: the capability the scheduler polls each tick.

use async_trait::async_trait;
use reqwest::header;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use super::client::fetch_with_fallback;
use super::parser::parse_feed;
use super::types::{FeedItem, MAX_RETRIES, RETRY_DELAY};
use super::util::{decode_body, is_valid_url, try_decompressions};
use crate::error::{RelayError, Result};
use crate::TARGET_WEB_REQUEST;

/// Anything that can turn a feed URL into its current items, newest first as
/// published by the feed.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, feed_url: &str) -> Result<Vec<FeedItem>>;
}

/// Fetches feeds over HTTP.
///
/// A GET has no side effects, so failed fetches are retried a few times
/// before the feed is given up for the current tick.
pub struct HttpFeedSource {
    max_retries: usize,
    retry_delay: Duration,
}

impl Default for HttpFeedSource {
    fn default() -> Self {
        HttpFeedSource {
            max_retries: MAX_RETRIES,
            retry_delay: RETRY_DELAY,
        }
    }
}

impl HttpFeedSource {
    pub fn with_retries(max_retries: usize, retry_delay: Duration) -> Self {
        HttpFeedSource {
            max_retries: max_retries.max(1),
            retry_delay,
        }
    }

    async fn fetch_once(&self, feed_url: &str) -> Result<Vec<FeedItem>> {
        let (response, browser_emulation_used) = fetch_with_fallback(feed_url).await?;
        if browser_emulation_used {
            info!(target: TARGET_WEB_REQUEST, "Browser emulation was required for {}", feed_url);
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(|s| s.to_lowercase());
        let content_encoding = response
            .headers()
            .get(header::CONTENT_ENCODING)
            .and_then(|value| value.to_str().ok())
            .map(|s| s.to_lowercase());

        let bytes = response.bytes().await?;
        let decompressed = try_decompressions(&bytes, content_encoding.as_deref(), feed_url);

        let (text, encoding) = decode_body(&decompressed, content_type.as_deref())
            .ok_or_else(|| {
                RelayError::transport(format!("Could not decode body of {}", feed_url))
            })?;
        if let Some(encoding) = encoding {
            debug!(target: TARGET_WEB_REQUEST, "Decoded {} as {}", feed_url, encoding);
        }

        parse_feed(&text, feed_url)
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, feed_url: &str) -> Result<Vec<FeedItem>> {
        if !is_valid_url(feed_url) {
            return Err(RelayError::transport(format!("Invalid feed URL: {}", feed_url)));
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            debug!(target: TARGET_WEB_REQUEST, "Loading feed from {} (attempt {})", feed_url, attempts);

            match self.fetch_once(feed_url).await {
                Ok(items) => return Ok(items),
                Err(err) if attempts >= self.max_retries => {
                    error!(target: TARGET_WEB_REQUEST, "Max retries reached for {}: {}", feed_url, err);
                    return Err(err);
                }
                Err(err) => {
                    warn!(target: TARGET_WEB_REQUEST, "Fetching {} failed: {}. Retrying in {:?}", feed_url, err, self.retry_delay);
                    sleep(self.retry_delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title><link>https://example.com</link><description>d</description>
<item><title>First</title><link>https://example.com/1</link></item>
<item><title>Second</title><link>https://example.com/2</link></item>
</channel></rss>"#;

    #[tokio::test]
    async fn test_fetch_parses_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.rss"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/rss+xml")
                    .set_body_string(RSS),
            )
            .mount(&server)
            .await;

        let source = HttpFeedSource::with_retries(1, Duration::from_millis(0));
        let items = source
            .fetch(&format!("{}/feed.rss", server.uri()))
            .await
            .unwrap();
        let links: Vec<_> = items.iter().map(|i| i.link.as_str()).collect();
        assert_eq!(links, vec!["https://example.com/1", "https://example.com/2"]);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = HttpFeedSource::with_retries(2, Duration::from_millis(0));
        let err = source
            .fetch(&format!("{}/feed.rss", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Transport { status: Some(500), .. }));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let source = HttpFeedSource::default();
        assert!(source.fetch("file:///etc/passwd").await.is_err());
    }
}
