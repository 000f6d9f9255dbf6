//! HTTP client creation and request handling for RSS feeds.

use reqwest::{cookie::Jar, header};
use std::sync::Arc;
use tracing::{debug, info};

use super::types::REQUEST_TIMEOUT;
use crate::error::{RelayError, Result};
use crate::{TARGET_WEB_REQUEST, USER_AGENT};

const FEED_ACCEPT: &str =
    "application/rss+xml, application/atom+xml, application/xml, text/xml, */*;q=0.9";
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:138.0) Gecko/20100101 Firefox/138.0";

/// Create a client with either standard or browser emulation settings
pub fn create_http_client(browser_emulation: bool) -> Result<reqwest::Client> {
    let builder = reqwest::Client::builder()
        .cookie_store(true)
        .cookie_provider(Arc::new(Jar::default()))
        .gzip(true)
        .timeout(REQUEST_TIMEOUT)
        .redirect(reqwest::redirect::Policy::default());

    let builder = if browser_emulation {
        debug!(target: TARGET_WEB_REQUEST, "Creating browser emulation HTTP client");
        builder.user_agent(BROWSER_USER_AGENT)
    } else {
        debug!(target: TARGET_WEB_REQUEST, "Creating standard HTTP client");
        builder.user_agent(USER_AGENT)
    };

    builder
        .build()
        .map_err(|e| RelayError::transport(format!("Failed to build HTTP client: {}", e)))
}

/// Attempt to fetch a URL, retrying once with browser-like headers when the
/// plain request is refused.
///
/// Returns the response together with whether browser emulation was needed.
pub async fn fetch_with_fallback(url: &str) -> Result<(reqwest::Response, bool)> {
    debug!(target: TARGET_WEB_REQUEST, "Attempting standard request to {}", url);

    let standard_client = create_http_client(false)?;
    let standard_error = match standard_client
        .get(url)
        .header(header::ACCEPT, FEED_ACCEPT)
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            debug!(target: TARGET_WEB_REQUEST, "Standard request to {} succeeded", url);
            return Ok((resp, false));
        }
        Ok(resp) => RelayError::Transport {
            status: Some(resp.status().as_u16()),
            message: format!("HTTP error from {}", url),
        },
        Err(err) => RelayError::from(err),
    };

    debug!(target: TARGET_WEB_REQUEST, "Standard request to {} failed ({}), trying browser emulation", url, standard_error);

    let browser_client = create_http_client(true)?;
    match browser_client
        .get(url)
        .header(
            header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        )
        .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.5")
        .header("DNT", "1")
        .header("Upgrade-Insecure-Requests", "1")
        .header("Sec-Fetch-Dest", "document")
        .header("Sec-Fetch-Mode", "navigate")
        .header("Sec-Fetch-Site", "none")
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            info!(target: TARGET_WEB_REQUEST, "Browser emulation request to {} succeeded", url);
            Ok((resp, true))
        }
        Ok(resp) => Err(RelayError::Transport {
            status: Some(resp.status().as_u16()),
            message: format!(
                "Both standard and browser emulation requests to {} failed",
                url
            ),
        }),
        Err(_) => Err(standard_error),
    }
}
