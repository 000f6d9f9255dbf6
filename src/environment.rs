use std::env;
use std::path::PathBuf;
use tokio::time::Duration;

use crate::detector::FingerprintStrategy;
use crate::error::{RelayError, Result};
use crate::rss::is_valid_url;

pub const DEFAULT_FEEDS: &[&str] = &[
    "https://micronews.debian.org/feeds/feed.rss",
    "https://bits.debian.org/feeds/feed.rss",
];
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_TOKEN_FILE: &str = ".data/token_store.json";
pub const DEFAULT_SNAPSHOT_FILE: &str = ".data/feed_snapshot.json";
pub const DEFAULT_API_BASE_URL: &str = "https://api.twitter.com";

/// Splits a delimited configuration value into a vector of trimmed strings.
///
/// Empty segments are dropped, so `"a;;b; "` yields `["a", "b"]`.
///
/// # Arguments
/// - `value`: The raw configuration value.
/// - `delimiter`: The character to split the value by.
///
/// # Returns
/// - `Vec<String>`
pub fn split_delimited(value: &str, delimiter: char) -> Vec<String> {
    value
        .split(delimiter)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Reads `FINGERPRINT_STRATEGY`, defaulting to link fingerprints.
pub fn fingerprint_strategy<F>(lookup: F) -> Result<FingerprintStrategy>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup("FINGERPRINT_STRATEGY") {
        Some(raw) => raw.parse(),
        None => Ok(FingerprintStrategy::default()),
    }
}

pub fn fingerprint_strategy_from_env() -> Result<FingerprintStrategy> {
    fingerprint_strategy(|name| env::var(name).ok())
}

/// Runtime configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub feeds: Vec<String>,
    pub poll_interval: Duration,
    pub token_file: PathBuf,
    pub snapshot_file: PathBuf,
    pub api_base_url: String,
    pub fingerprint_strategy: FingerprintStrategy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    RelayError::Config(format!("Missing {} environment variable", name))
                })
        };

        let consumer_key = required("TWITTER_API_KEY")?;
        let consumer_secret = required("TWITTER_KEY_SECRET")?;

        let feeds: Vec<String> = match lookup("FEEDS") {
            Some(raw) => split_delimited(&raw, ';'),
            None => DEFAULT_FEEDS.iter().map(|s| s.to_string()).collect(),
        };
        if feeds.is_empty() {
            return Err(RelayError::Config("FEEDS is set but empty".to_string()));
        }
        if let Some(bad) = feeds.iter().find(|f| !is_valid_url(f)) {
            return Err(RelayError::Config(format!("Invalid feed URL: {}", bad)));
        }

        let poll_interval = match lookup("POLL_INTERVAL_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    RelayError::Config(format!("POLL_INTERVAL_SECS is not a number: {}", raw))
                })?;
                if secs == 0 {
                    return Err(RelayError::Config(
                        "POLL_INTERVAL_SECS must be greater than zero".to_string(),
                    ));
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_POLL_INTERVAL,
        };

        let fingerprint_strategy = fingerprint_strategy(&lookup)?;

        Ok(Config {
            consumer_key,
            consumer_secret,
            feeds,
            poll_interval,
            token_file: lookup("TOKEN_FILE_PATH")
                .unwrap_or_else(|| DEFAULT_TOKEN_FILE.to_string())
                .into(),
            snapshot_file: lookup("SNAPSHOT_FILE_PATH")
                .unwrap_or_else(|| DEFAULT_SNAPSHOT_FILE.to_string())
                .into(),
            api_base_url: lookup("API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            fingerprint_strategy,
        })
    }
}
