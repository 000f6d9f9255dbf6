//! Turns a feed item into a post and submits it.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{Credential, OAuthClient};
use crate::error::{RelayError, Result};
use crate::rss::FeedItem;
use crate::TARGET_PUBLISH;

pub const MAX_POST_CHARS: usize = 280;
pub const MAX_TITLE_CHARS: usize = 150;

/// Body of a post submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostPayload {
    pub text: String,
}

/// What the remote assigned to a published post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub post_id: String,
    pub text: String,
    pub post_url: String,
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    data: Option<PostData>,
}

#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
}

/// Cuts `s` to at most `max` characters.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// `#tag` per category, whitespace removed, space separated.
pub fn hashtags(categories: &[String]) -> String {
    categories
        .iter()
        .map(|c| c.chars().filter(|ch| !ch.is_whitespace()).collect::<String>())
        .map(|c| c.trim_start_matches('#').to_string())
        .filter(|c| !c.is_empty())
        .map(|c| format!("#{}", c))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builds the post text for `item`.
///
/// Layout is `<title, at most 150 chars> <hashtags>\n<link>`, at most 280
/// characters in total. When that is too long only the title and hashtag part
/// is shortened, so the link survives whenever it fits at all.
pub fn format_post(item: &FeedItem) -> PostPayload {
    let title = truncate_chars(item.title.trim(), MAX_TITLE_CHARS).trim_end();
    let tags = hashtags(&item.categories);
    let head = [title, tags.as_str()]
        .iter()
        .filter(|part| !part.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" ");
    let link = item.link.trim();

    let text = if link.is_empty() {
        truncate_chars(&head, MAX_POST_CHARS).trim_end().to_string()
    } else if head.is_empty() {
        truncate_chars(link, MAX_POST_CHARS).to_string()
    } else {
        let link_len = link.chars().count();
        if link_len >= MAX_POST_CHARS {
            // No room left for the separator; the hard limit wins.
            truncate_chars(&format!("{}\n{}", head, link), MAX_POST_CHARS).to_string()
        } else {
            let budget = MAX_POST_CHARS - link_len - 1;
            let head = truncate_chars(&head, budget).trim_end();
            if head.is_empty() {
                link.to_string()
            } else {
                format!("{}\n{}", head, link)
            }
        }
    };

    PostPayload { text }
}

/// Format and submit a single item. Implementations do not retry.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, item: &FeedItem, credential: &Credential) -> Result<PublishResult>;
}

/// Publishes through the signed post endpoint.
pub struct ApiPublisher {
    client: OAuthClient,
}

impl ApiPublisher {
    pub fn new(client: OAuthClient) -> Self {
        ApiPublisher { client }
    }
}

pub fn post_url(account_handle: &str, post_id: &str) -> String {
    if account_handle.is_empty() {
        format!("https://twitter.com/i/web/status/{}", post_id)
    } else {
        format!("https://twitter.com/{}/status/{}", account_handle, post_id)
    }
}

#[async_trait]
impl Publisher for ApiPublisher {
    async fn publish(&self, item: &FeedItem, credential: &Credential) -> Result<PublishResult> {
        let payload = format_post(item);
        let endpoint = self.client.endpoints().post.clone();

        let body = self
            .client
            .signed_request(Method::POST, &endpoint, Some(credential.pair()), &[], Some(&payload))
            .await?;

        let response: PostResponse = serde_json::from_str(&body).map_err(|e| {
            RelayError::Protocol(format!("Unexpected post response ({}): {}", e, body))
        })?;
        let post_id = response
            .data
            .map(|d| d.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RelayError::Protocol(format!("Post response has no id: {}", body)))?;

        let post_url = post_url(&credential.account_handle, &post_id);
        info!(target: TARGET_PUBLISH, "New post: {}", post_url);

        Ok(PublishResult {
            post_id,
            text: payload.text,
            post_url,
        })
    }
}

/// Logs what would be posted instead of posting it.
#[derive(Debug, Default)]
pub struct DryRunPublisher;

#[async_trait]
impl Publisher for DryRunPublisher {
    async fn publish(&self, item: &FeedItem, _credential: &Credential) -> Result<PublishResult> {
        let payload = format_post(item);
        info!(target: TARGET_PUBLISH, "[dry run] would post: {:?}", payload.text);
        Ok(PublishResult {
            post_id: "dry-run".to_string(),
            text: payload.text,
            post_url: String::new(),
        })
    }
}
