//! Change detection: decides which feed items have not been published yet.
//!
//! Each item is reduced to an [`ItemFingerprint`]. The [`FeedSnapshot`]
//! remembers, per feed, the fingerprints seen at the last successful poll,
//! and [`ChangeDetector::diff`] compares a fresh fetch against it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::RelayError;
use crate::rss::FeedItem;

/// Stable identifier of a feed item, used only for membership tests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemFingerprint(String);

impl ItemFingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        ItemFingerprint(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How items are fingerprinted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FingerprintStrategy {
    /// The item's link. Survives upstream typo fixes in titles. Items without
    /// a link fall back to [`FingerprintStrategy::ContentHash`].
    #[default]
    Link,
    /// SHA-256 over the serialized item.
    ContentHash,
}

impl FromStr for FingerprintStrategy {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "link" => Ok(FingerprintStrategy::Link),
            "hash" | "content" | "content-hash" => Ok(FingerprintStrategy::ContentHash),
            other => Err(RelayError::Config(format!(
                "Unknown fingerprint strategy: {}",
                other
            ))),
        }
    }
}

impl FingerprintStrategy {
    pub fn fingerprint(&self, item: &FeedItem) -> ItemFingerprint {
        match self {
            FingerprintStrategy::Link => {
                let link = item.link.trim();
                if link.is_empty() {
                    content_hash(item)
                } else {
                    ItemFingerprint::new(link)
                }
            }
            FingerprintStrategy::ContentHash => content_hash(item),
        }
    }
}

fn content_hash(item: &FeedItem) -> ItemFingerprint {
    // Field order is fixed by the struct definition, so the JSON is stable.
    let serialized = serde_json::to_string(item).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    ItemFingerprint(format!("sha256:{:x}", hasher.finalize()))
}

/// Fingerprints recorded per feed URL at the last successful poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedSnapshot(BTreeMap<String, Vec<ItemFingerprint>>);

impl FeedSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, feed_id: &str) -> Option<&[ItemFingerprint]> {
        self.0.get(feed_id).map(Vec::as_slice)
    }

    /// Replaces the entry for `feed_id`. Returns true when it changed.
    pub fn replace(&mut self, feed_id: &str, fingerprints: Vec<ItemFingerprint>) -> bool {
        if self.get(feed_id) == Some(fingerprints.as_slice()) {
            return false;
        }
        self.0.insert(feed_id.to_string(), fingerprints);
        true
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of comparing one fetch of a feed against the stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDiff {
    pub is_first_run: bool,
    /// Items to publish, in feed order.
    pub new_items: Vec<FeedItem>,
    /// Fingerprints of every current item, in feed order.
    pub next_snapshot: Vec<ItemFingerprint>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector {
    strategy: FingerprintStrategy,
}

impl ChangeDetector {
    pub fn new(strategy: FingerprintStrategy) -> Self {
        ChangeDetector { strategy }
    }

    pub fn fingerprint(&self, item: &FeedItem) -> ItemFingerprint {
        self.strategy.fingerprint(item)
    }

    /// Computes which of `current_items` are new for `feed_id`.
    ///
    /// An absent or empty stored entry is a first run: nothing is reported as
    /// new and every current fingerprint is seeded. The result depends only
    /// on the arguments.
    pub fn diff(&self, snapshot: &FeedSnapshot, feed_id: &str, current_items: &[FeedItem]) -> FeedDiff {
        let next_snapshot: Vec<ItemFingerprint> =
            current_items.iter().map(|item| self.fingerprint(item)).collect();

        let stored = match snapshot.get(feed_id) {
            Some(stored) if !stored.is_empty() => stored,
            _ => {
                return FeedDiff {
                    is_first_run: true,
                    new_items: Vec::new(),
                    next_snapshot,
                }
            }
        };

        let new_items = {
            let known: HashSet<&ItemFingerprint> = stored.iter().collect();
            let mut reported: HashSet<&ItemFingerprint> = HashSet::new();
            current_items
                .iter()
                .zip(next_snapshot.iter())
                .filter(|(_, fp)| !known.contains(fp) && reported.insert(*fp))
                .map(|(item, _)| item.clone())
                .collect()
        };

        FeedDiff {
            is_first_run: false,
            new_items,
            next_snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = "https://micronews.debian.org/feeds/feed.rss";

    fn item(title: &str, link: &str) -> FeedItem {
        FeedItem::new(title, link)
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = item("Debian 13", "https://example.org/13").with_categories(["release"]);
        for strategy in [FingerprintStrategy::Link, FingerprintStrategy::ContentHash] {
            assert_eq!(strategy.fingerprint(&a), strategy.fingerprint(&a.clone()));
        }
    }

    #[test]
    fn test_link_fingerprint_ignores_title_edits() {
        let strategy = FingerprintStrategy::Link;
        let original = item("Debain 13 released", "https://example.org/13");
        let corrected = item("Debian 13 released", "https://example.org/13");
        assert_eq!(strategy.fingerprint(&original), strategy.fingerprint(&corrected));
        assert_eq!(strategy.fingerprint(&original).as_str(), "https://example.org/13");

        let hash = FingerprintStrategy::ContentHash;
        assert_ne!(hash.fingerprint(&original), hash.fingerprint(&corrected));
    }

    #[test]
    fn test_link_fingerprint_falls_back_to_hash() {
        let linkless = item("No link here", "  ");
        let fp = FingerprintStrategy::Link.fingerprint(&linkless);
        assert!(fp.as_str().starts_with("sha256:"));
        assert_eq!(fp, FingerprintStrategy::ContentHash.fingerprint(&linkless));
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("link".parse::<FingerprintStrategy>().unwrap(), FingerprintStrategy::Link);
        assert_eq!(" HASH ".parse::<FingerprintStrategy>().unwrap(), FingerprintStrategy::ContentHash);
        assert!("cookie".parse::<FingerprintStrategy>().is_err());
    }

    #[test]
    fn test_first_run_seeds_without_new_items() {
        let detector = ChangeDetector::default();
        let items: Vec<FeedItem> = (0..25)
            .map(|i| item(&format!("Item {}", i), &format!("https://example.org/{}", i)))
            .collect();

        let diff = detector.diff(&FeedSnapshot::new(), FEED, &items);
        assert!(diff.is_first_run);
        assert!(diff.new_items.is_empty());
        assert_eq!(diff.next_snapshot.len(), 25);

        // An entry that exists but is empty is also a first run.
        let mut snapshot = FeedSnapshot::new();
        snapshot.replace(FEED, Vec::new());
        let diff = detector.diff(&snapshot, FEED, &items);
        assert!(diff.is_first_run);
        assert!(diff.new_items.is_empty());
    }

    #[test]
    fn test_diff_reports_unknown_items_in_feed_order() {
        let detector = ChangeDetector::default();
        let mut snapshot = FeedSnapshot::new();
        snapshot.replace(
            FEED,
            vec![
                ItemFingerprint::new("https://example.org/b"),
                ItemFingerprint::new("https://example.org/d"),
            ],
        );

        let items = vec![
            item("A", "https://example.org/a"),
            item("B", "https://example.org/b"),
            item("C", "https://example.org/c"),
            item("D", "https://example.org/d"),
        ];
        let diff = detector.diff(&snapshot, FEED, &items);
        assert!(!diff.is_first_run);
        let titles: Vec<_> = diff.new_items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "C"]);
        assert_eq!(diff.next_snapshot.len(), 4);
        assert_eq!(diff.next_snapshot[0].as_str(), "https://example.org/a");
    }

    #[test]
    fn test_diff_is_idempotent_after_replacement() {
        let detector = ChangeDetector::default();
        let mut snapshot = FeedSnapshot::new();
        snapshot.replace(FEED, vec![ItemFingerprint::new("https://example.org/old")]);

        let items = vec![
            item("New", "https://example.org/new"),
            item("Old", "https://example.org/old"),
        ];
        let first = detector.diff(&snapshot, FEED, &items);
        assert_eq!(first.new_items.len(), 1);

        snapshot.replace(FEED, first.next_snapshot.clone());
        let second = detector.diff(&snapshot, FEED, &items);
        assert!(second.new_items.is_empty());
        assert_eq!(second, detector.diff(&snapshot, FEED, &items));
    }

    #[test]
    fn test_duplicate_items_in_one_fetch_reported_once() {
        let detector = ChangeDetector::default();
        let mut snapshot = FeedSnapshot::new();
        snapshot.replace(FEED, vec![ItemFingerprint::new("https://example.org/old")]);

        let items = vec![
            item("New", "https://example.org/new"),
            item("New (again)", "https://example.org/new"),
        ];
        let diff = detector.diff(&snapshot, FEED, &items);
        assert_eq!(diff.new_items.len(), 1);
        assert_eq!(diff.new_items[0].title, "New");
    }

    #[test]
    fn test_snapshot_replace_reports_change() {
        let mut snapshot = FeedSnapshot::new();
        let fps = vec![ItemFingerprint::new("x")];
        assert!(snapshot.replace(FEED, fps.clone()));
        assert!(!snapshot.replace(FEED, fps));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(FEED).map(<[_]>::len), Some(1));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let mut snapshot = FeedSnapshot::new();
        snapshot.replace(FEED, vec![ItemFingerprint::new("https://example.org/a")]);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json, serde_json::json!({ FEED: ["https://example.org/a"] }));
    }
}
