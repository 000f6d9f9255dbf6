//! OAuth 1.0a authentication: the one-time handshake that produces a
//! [`Credential`], and per-request signing of every API call.

mod handshake;
pub mod signature;
mod types;

pub use self::handshake::{Handshake, OAuthClient};
pub use self::types::*;
