//! RSS/Atom feed access for feedcaster.
//!
//! This module fetches feeds over HTTP and turns their entries into
//! [`FeedItem`]s. The XML itself is handled by `feed-rs`.

mod client;
mod fetcher;
mod parser;
mod types;
mod util;

pub use self::types::*;

pub use self::fetcher::{FeedSource, HttpFeedSource};
pub use self::util::is_valid_url;
