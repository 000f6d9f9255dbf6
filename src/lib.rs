pub mod auth;
pub mod detector;
pub mod environment;
pub mod error;
pub mod logging;
pub mod publish;
pub mod rss;
pub mod scheduler;
pub mod store;

pub use error::{RelayError, Result};

pub const TARGET_WEB_REQUEST: &str = "web_request";
pub const TARGET_AUTH: &str = "auth";
pub const TARGET_STATE: &str = "state";
pub const TARGET_PUBLISH: &str = "publish";

/// User agent sent with every outbound API call.
pub const USER_AGENT: &str = concat!("feedcaster/", env!("CARGO_PKG_VERSION"));
