//! OAuth 1.0a request signing (HMAC-SHA1).
//!
//! Everything here is a pure function of its inputs, the nonce and timestamp
//! included. Fresh values are produced by [`generate_nonce`] and
//! [`current_timestamp`] at the call site.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use url::Url;

use super::types::{Consumer, TokenPair};
use crate::error::{RelayError, Result};

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const OAUTH_VERSION: &str = "1.0";

/// RFC 3986 percent-encoding; everything but `A-Za-z0-9-._~` is escaped.
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// `scheme://host[:port]/path`, lowercased scheme and host, default port and
/// query dropped.
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = format!(
        "{}://{}",
        url.scheme().to_lowercase(),
        url.host_str().unwrap_or_default().to_lowercase()
    );
    if let Some(port) = url.port() {
        normalized.push_str(&format!(":{}", port));
    }
    normalized.push_str(url.path());
    normalized
}

/// 16 random bytes from the system RNG, hex encoded.
pub fn generate_nonce() -> Result<String> {
    let mut bytes = [0u8; 16];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| RelayError::Signing("Failed to generate a secure nonce".to_string()))?;
    Ok(bytes.iter().map(|b| format!("{:02x}", b)).collect())
}

pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Inputs for one signature.
#[derive(Debug, Clone)]
pub struct OAuthRequest<'a> {
    pub method: &'a str,
    pub url: &'a Url,
    /// Form body parameters. JSON bodies are not signed.
    pub body_params: &'a [(&'a str, &'a str)],
    /// Extra `oauth_*` parameters, such as `oauth_callback`.
    pub oauth_extra: &'a [(&'a str, &'a str)],
    pub nonce: &'a str,
    pub timestamp: i64,
}

/// The outcome of signing: the signature and the full `Authorization` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeader {
    pub signature: String,
    pub authorization: String,
}

fn oauth_params(
    consumer: &Consumer,
    token: Option<TokenPair<'_>>,
    request: &OAuthRequest<'_>,
) -> Vec<(String, String)> {
    let mut params = vec![
        ("oauth_consumer_key".to_string(), consumer.key.clone()),
        ("oauth_nonce".to_string(), request.nonce.to_string()),
        ("oauth_signature_method".to_string(), SIGNATURE_METHOD.to_string()),
        ("oauth_timestamp".to_string(), request.timestamp.to_string()),
        ("oauth_version".to_string(), OAUTH_VERSION.to_string()),
    ];
    if let Some(token) = token {
        params.push(("oauth_token".to_string(), token.token.to_string()));
    }
    for (key, value) in request.oauth_extra {
        params.push((key.to_string(), value.to_string()));
    }
    params
}

/// The sorted, encoded `k=v&...` parameter string.
pub fn parameter_string(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// `METHOD&enc(url)&enc(params)` over the oauth, query and body parameters.
pub fn signature_base_string(
    consumer: &Consumer,
    token: Option<TokenPair<'_>>,
    request: &OAuthRequest<'_>,
) -> String {
    let mut params = oauth_params(consumer, token, request);
    params.extend(
        request
            .url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned())),
    );
    params.extend(
        request
            .body_params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string())),
    );

    format!(
        "{}&{}&{}",
        request.method.to_uppercase(),
        percent_encode(&normalize_url(request.url)),
        percent_encode(&parameter_string(&params))
    )
}

/// Signs `request` and builds the `Authorization: OAuth ...` header value.
pub fn sign(consumer: &Consumer, token: Option<TokenPair<'_>>, request: &OAuthRequest<'_>) -> SignedHeader {
    let base = signature_base_string(consumer, token, request);
    let signing_key = format!(
        "{}&{}",
        percent_encode(&consumer.secret),
        percent_encode(token.map(|t| t.secret).unwrap_or_default())
    );
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, signing_key.as_bytes());
    let signature = STANDARD.encode(hmac::sign(&key, base.as_bytes()).as_ref());

    let mut header_params = oauth_params(consumer, token, request);
    header_params.push(("oauth_signature".to_string(), signature.clone()));
    header_params.sort();
    let authorization = format!(
        "OAuth {}",
        header_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ")
    );

    SignedHeader {
        signature,
        authorization,
    }
}
