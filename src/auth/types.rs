//! Credentials and endpoints used by the OAuth 1.0a handshake.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::{RelayError, Result};

/// The application's consumer key and secret.
#[derive(Clone)]
pub struct Consumer {
    pub key: String,
    pub secret: String,
}

impl Consumer {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Consumer {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// A token and its secret, borrowed from whichever stage of the handshake
/// produced them.
#[derive(Debug, Clone, Copy)]
pub struct TokenPair<'a> {
    pub token: &'a str,
    pub secret: &'a str,
}

/// Short-lived token issued by the first handshake step.
#[derive(Clone, PartialEq, Eq)]
pub struct RequestToken {
    pub token: String,
    pub token_secret: String,
    pub callback_confirmed: bool,
}

impl RequestToken {
    pub fn pair(&self) -> TokenPair<'_> {
        TokenPair {
            token: &self.token,
            secret: &self.token_secret,
        }
    }
}

impl fmt::Debug for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestToken")
            .field("token", &self.token)
            .field("token_secret", &"<redacted>")
            .field("callback_confirmed", &self.callback_confirmed)
            .finish()
    }
}

/// Long-lived access credential. Never mutated; a new handshake replaces it.
///
/// Serialized with the field names the platform returns so that existing
/// token files keep working.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "oauth_token", default)]
    pub token: String,
    #[serde(rename = "oauth_token_secret", default)]
    pub token_secret: String,
    #[serde(rename = "screen_name", default)]
    pub account_handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Credential {
    pub fn pair(&self) -> TokenPair<'_> {
        TokenPair {
            token: &self.token,
            secret: &self.token_secret,
        }
    }

    /// A credential is usable only with both the token and its secret.
    pub fn is_complete(&self) -> bool {
        !self.token.trim().is_empty() && !self.token_secret.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &self.token)
            .field("token_secret", &"<redacted>")
            .field("account_handle", &self.account_handle)
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Where the handshake and post submission happen.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub request_token: Url,
    pub authorize: Url,
    pub access_token: Url,
    pub post: Url,
}

impl Endpoints {
    /// Builds the endpoint set under an API host such as
    /// `https://api.twitter.com`.
    pub fn from_base(base: &str) -> Result<Self> {
        let base = Url::parse(base.trim_end_matches('/'))
            .map_err(|e| RelayError::Config(format!("Invalid API base URL {}: {}", base, e)))?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| RelayError::Config(format!("Invalid endpoint {}: {}", path, e)))
        };

        Ok(Endpoints {
            request_token: join("/oauth/request_token")?,
            authorize: join("/oauth/authorize")?,
            access_token: join("/oauth/access_token")?,
            post: join("/2/tweets")?,
        })
    }
}

/// Where a handshake currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    RequestTokenObtained(RequestToken),
    /// Terminal. The caller persists the credential.
    Authorized(Credential),
}
