//! The polling loop.
//!
//! One tick walks every configured feed in order: fetch, diff against the
//! snapshot, publish what is new, then record what was seen. The snapshot is
//! owned by the tick; it goes in by value and comes back out.

use std::fmt;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::auth::Credential;
use crate::detector::{ChangeDetector, FeedSnapshot, ItemFingerprint};
use crate::error::RelayError;
use crate::publish::{PublishResult, Publisher};
use crate::rss::FeedSource;
use crate::store::SnapshotStore;
use crate::{TARGET_PUBLISH, TARGET_STATE, TARGET_WEB_REQUEST};

/// What happened to one feed during a tick.
#[derive(Debug)]
pub enum FeedOutcome {
    /// First sighting of the feed; its items were recorded, nothing posted.
    Seeded { items: usize },
    /// No new items.
    Unchanged,
    /// New items were found. Posts that failed with a transport error are
    /// retried on the next tick.
    Published {
        published: Vec<PublishResult>,
        failed: Vec<(String, RelayError)>,
    },
    /// The feed could not be fetched or parsed. The snapshot is untouched.
    Failed(RelayError),
}

impl fmt::Display for FeedOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedOutcome::Seeded { items } => write!(f, "seeded {} items", items),
            FeedOutcome::Unchanged => write!(f, "no new items"),
            FeedOutcome::Published { published, failed } => {
                write!(f, "published {}, failed {}", published.len(), failed.len())
            }
            FeedOutcome::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

#[derive(Debug)]
pub struct FeedReport {
    pub feed_url: String,
    pub outcome: FeedOutcome,
}

/// Per-feed outcomes of one tick, in feed order.
#[derive(Debug, Default)]
pub struct TickReport {
    pub feeds: Vec<FeedReport>,
}

impl TickReport {
    pub fn published(&self) -> impl Iterator<Item = &PublishResult> {
        self.feeds.iter().flat_map(|report| match &report.outcome {
            FeedOutcome::Published { published, .. } => published.as_slice(),
            _ => &[][..],
        })
    }

    pub fn failed_feeds(&self) -> impl Iterator<Item = &FeedReport> {
        self.feeds
            .iter()
            .filter(|report| matches!(report.outcome, FeedOutcome::Failed(_)))
    }
}

pub struct Scheduler {
    feeds: Vec<String>,
    poll_interval: Duration,
    source: Box<dyn FeedSource>,
    publisher: Box<dyn Publisher>,
    store: SnapshotStore,
    detector: ChangeDetector,
}

impl Scheduler {
    pub fn new(
        feeds: Vec<String>,
        poll_interval: Duration,
        source: Box<dyn FeedSource>,
        publisher: Box<dyn Publisher>,
        store: SnapshotStore,
        detector: ChangeDetector,
    ) -> Self {
        Scheduler {
            feeds,
            poll_interval,
            source,
            publisher,
            store,
            detector,
        }
    }

    /// Polls every feed once and returns the updated snapshot.
    ///
    /// Errors are captured per feed and never stop the remaining feeds.
    pub async fn tick(
        &self,
        mut snapshot: FeedSnapshot,
        credential: &Credential,
    ) -> (FeedSnapshot, TickReport) {
        let mut report = TickReport::default();

        for feed_url in self.feeds.iter().map(|f| f.trim()) {
            if feed_url.is_empty() {
                continue;
            }
            let outcome = self.process_feed(&mut snapshot, feed_url, credential).await;
            match &outcome {
                FeedOutcome::Failed(err) => {
                    error!(target: TARGET_WEB_REQUEST, "Feed {}: {}", feed_url, err)
                }
                other => debug!(target: TARGET_WEB_REQUEST, "Feed {}: {}", feed_url, other),
            }
            report.feeds.push(FeedReport {
                feed_url: feed_url.to_string(),
                outcome,
            });
        }

        (snapshot, report)
    }

    async fn process_feed(
        &self,
        snapshot: &mut FeedSnapshot,
        feed_url: &str,
        credential: &Credential,
    ) -> FeedOutcome {
        let items = match self.source.fetch(feed_url).await {
            Ok(items) => items,
            Err(err) => return FeedOutcome::Failed(err),
        };

        let diff = self.detector.diff(snapshot, feed_url, &items);

        if diff.is_first_run {
            info!(target: TARGET_STATE, "First run for {}, recording {} items without posting", feed_url, items.len());
            let seeded = diff.next_snapshot.len();
            self.record(snapshot, feed_url, diff.next_snapshot);
            return FeedOutcome::Seeded { items: seeded };
        }

        // Only a poll with new items replaces the entry. Items that briefly
        // leave the feed window keep their fingerprints.
        if diff.new_items.is_empty() {
            return FeedOutcome::Unchanged;
        }

        let mut published = Vec::new();
        let mut failed = Vec::new();
        let mut failed_fingerprints: Vec<ItemFingerprint> = Vec::new();

        for item in &diff.new_items {
            match self.publisher.publish(item, credential).await {
                Ok(result) => {
                    info!(target: TARGET_PUBLISH, "Posted \"{}\" from {}", item.title, feed_url);
                    published.push(result);
                }
                Err(err) => {
                    warn!(target: TARGET_PUBLISH, "Failed to post \"{}\" from {}: {}", item.title, feed_url, err);
                    // A protocol error comes from a 2xx answer without a post
                    // id: the post exists, so it is recorded as seen.
                    if !matches!(err, RelayError::Protocol(_)) {
                        failed_fingerprints.push(self.detector.fingerprint(item));
                    }
                    failed.push((item.title.clone(), err));
                }
            }
        }

        // Items that failed to post stay out of the snapshot so the next tick
        // picks them up again.
        let persisted: Vec<ItemFingerprint> = diff
            .next_snapshot
            .into_iter()
            .filter(|fp| !failed_fingerprints.contains(fp))
            .collect();

        // An empty entry would turn the next tick into a first run.
        if persisted.is_empty() {
            debug!(target: TARGET_STATE, "Keeping previous snapshot entry for {}", feed_url);
        } else {
            self.record(snapshot, feed_url, persisted);
        }

        FeedOutcome::Published { published, failed }
    }

    /// Replaces the feed's entry and saves the snapshot if it changed.
    /// A failed save is logged; the in-memory snapshot stays current.
    fn record(&self, snapshot: &mut FeedSnapshot, feed_url: &str, fingerprints: Vec<ItemFingerprint>) {
        if !snapshot.replace(feed_url, fingerprints) {
            return;
        }
        if let Err(err) = self.store.save(snapshot) {
            warn!(target: TARGET_STATE, "Could not save snapshot after {}: {}", feed_url, err);
        }
    }

    /// Loads the stored snapshot and performs a single tick.
    pub async fn run_once(&self, credential: &Credential) -> TickReport {
        let snapshot = self.store.load();
        let (_, report) = self.tick(snapshot, credential).await;
        report
    }

    /// Ticks forever. The first tick fires immediately.
    pub async fn run(&self, credential: &Credential) {
        let mut snapshot = self.store.load();
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Watching {} feeds every {} seconds",
            self.feeds.len(),
            self.poll_interval.as_secs()
        );

        loop {
            ticker.tick().await;
            let (next, report) = self.tick(snapshot, credential).await;
            snapshot = next;
            info!(
                "Tick finished: {} posted, {} of {} feeds failed",
                report.published().count(),
                report.failed_feeds().count(),
                report.feeds.len()
            );
        }
    }
}
