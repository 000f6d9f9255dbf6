//! Feed parsing for RSS and Atom documents.

use feed_rs::model::Entry;
use feed_rs::parser;
use std::io::Cursor;
use tracing::{debug, warn};

use super::types::FeedItem;
use super::util::cleanup_xml;
use crate::error::{RelayError, Result};
use crate::TARGET_WEB_REQUEST;

/// Converts a parsed entry into a [`FeedItem`].
///
/// The first link is taken as the canonical one. Entries without a link keep
/// an empty `link` and are still returned.
pub fn entry_to_item(entry: &Entry) -> FeedItem {
    FeedItem {
        title: entry
            .title
            .as_ref()
            .map(|t| t.content.trim().to_string())
            .unwrap_or_default(),
        link: entry
            .links
            .first()
            .map(|link| link.href.trim().to_string())
            .unwrap_or_default(),
        categories: entry
            .categories
            .iter()
            .map(|c| c.term.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect(),
    }
}

/// Parses an RSS or Atom document into items, preserving feed order.
///
/// A document that fails to parse is cleaned up once and parsed again.
pub fn parse_feed(body: &str, feed_url: &str) -> Result<Vec<FeedItem>> {
    let first_err = match parser::parse(Cursor::new(body.as_bytes())) {
        Ok(feed) => {
            debug!(target: TARGET_WEB_REQUEST, "Parsed feed {} with {} entries", feed_url, feed.entries.len());
            return Ok(feed.entries.iter().map(entry_to_item).collect());
        }
        Err(err) => err,
    };

    let cleaned = cleanup_xml(body);
    if !(cleaned.contains("<rss") || cleaned.contains("<feed") || cleaned.contains("<rdf")) {
        let preview = if body
            .chars()
            .all(|c| c.is_ascii_graphic() || c.is_whitespace())
        {
            body.chars().take(100).collect::<String>()
        } else {
            "[binary data]".to_string()
        };
        return Err(RelayError::transport(format!(
            "Feed {} doesn't appear to be RSS or Atom. Content preview: {}",
            feed_url, preview
        )));
    }

    match parser::parse(Cursor::new(cleaned.as_bytes())) {
        Ok(feed) => {
            warn!(target: TARGET_WEB_REQUEST, "Feed {} parsed only after XML cleanup", feed_url);
            Ok(feed.entries.iter().map(entry_to_item).collect())
        }
        Err(second_err) => Err(RelayError::transport(format!(
            "Failed to parse feed {} even after cleanup. First error: {}. Second error: {}",
            feed_url, first_err, second_err
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Debian micronews</title>
    <link>https://micronews.debian.org</link>
    <description>News</description>
    <item>
      <title>Debian 13 released</title>
      <link>https://micronews.debian.org/2025/trixie.html</link>
      <category>release</category>
      <category>trixie</category>
    </item>
    <item>
      <title>DebConf registration open</title>
      <link>https://micronews.debian.org/2025/debconf.html</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_rss_preserves_order() {
        let items = parse_feed(RSS, "test").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Debian 13 released");
        assert_eq!(items[0].link, "https://micronews.debian.org/2025/trixie.html");
        assert_eq!(items[0].categories, vec!["release", "trixie"]);
        assert_eq!(items[1].title, "DebConf registration open");
        assert!(items[1].categories.is_empty());
    }

    #[test]
    fn test_parse_atom() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Bits from Debian</title>
  <id>urn:uuid:60a76c80-d399-11d9-b93C-0003939e0af6</id>
  <updated>2025-01-01T00:00:00Z</updated>
  <entry>
    <title>New developers</title>
    <link href="https://bits.debian.org/2025/01/new-developers.html"/>
    <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
    <updated>2025-01-01T00:00:00Z</updated>
    <category term="project"/>
  </entry>
</feed>"#;
        let items = parse_feed(atom, "test").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "https://bits.debian.org/2025/01/new-developers.html");
        assert_eq!(items[0].categories, vec!["project"]);
    }

    #[test]
    fn test_parse_garbage_is_transport_error() {
        let err = parse_feed("<html><body>blocked</body></html>", "test").unwrap_err();
        assert!(matches!(err, RelayError::Transport { .. }));
    }
}
