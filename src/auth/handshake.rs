//! The signed HTTP client and the three-step out-of-band handshake.

use reqwest::{header, Method};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use url::Url;

use super::signature::{current_timestamp, generate_nonce, sign, OAuthRequest};
use super::types::{AuthState, Consumer, Credential, Endpoints, RequestToken, TokenPair};
use crate::error::{RelayError, Result};
use crate::rss::REQUEST_TIMEOUT;
use crate::{TARGET_AUTH, USER_AGENT};

/// Signs and sends API calls on behalf of the configured consumer.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    consumer: Consumer,
    endpoints: Endpoints,
    http: reqwest::Client,
}

fn parse_form(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .into_owned()
        .collect()
}

fn require_field(fields: &HashMap<String, String>, name: &str, body: &str) -> Result<String> {
    fields
        .get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| {
            RelayError::Protocol(format!("Response is missing {}: {}", name, body.trim()))
        })
}

impl OAuthClient {
    pub fn new(consumer: Consumer, endpoints: Endpoints) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RelayError::transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(OAuthClient {
            consumer,
            endpoints,
            http,
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Sends one signed request and returns the response body.
    ///
    /// A fresh nonce and timestamp are generated for every call. Transport
    /// failures and non-2xx answers come back as [`RelayError::Transport`];
    /// nothing is retried here.
    pub async fn signed_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &Url,
        token: Option<TokenPair<'_>>,
        oauth_extra: &[(&str, &str)],
        json_body: Option<&B>,
    ) -> Result<String> {
        let nonce = generate_nonce()?;
        let signed = sign(
            &self.consumer,
            token,
            &OAuthRequest {
                method: method.as_str(),
                url,
                body_params: &[],
                oauth_extra,
                nonce: &nonce,
                timestamp: current_timestamp(),
            },
        );

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(header::AUTHORIZATION, signed.authorization);
        if let Some(body) = json_body {
            request = request
                .header(header::ACCEPT, "application/json")
                .json(body);
        }

        debug!(target: TARGET_AUTH, "Sending signed {} {}", method, url);
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!(target: TARGET_AUTH, "{} {} returned {}: {}", method, url, status, text);
            return Err(RelayError::Transport {
                status: Some(status.as_u16()),
                message: text,
            });
        }

        Ok(text)
    }

    /// Step one: ask for a request token with out-of-band callback and write
    /// access.
    pub async fn obtain_request_token(&self) -> Result<RequestToken> {
        let mut url = self.endpoints.request_token.clone();
        url.query_pairs_mut().append_pair("x_auth_access_type", "write");

        let body = self
            .signed_request::<()>(Method::POST, &url, None, &[("oauth_callback", "oob")], None)
            .await?;

        let fields = parse_form(&body);
        let token = RequestToken {
            token: require_field(&fields, "oauth_token", &body)?,
            token_secret: require_field(&fields, "oauth_token_secret", &body)?,
            callback_confirmed: fields
                .get("oauth_callback_confirmed")
                .map(|v| v == "true")
                .unwrap_or(false),
        };
        debug!(target: TARGET_AUTH, "Obtained request token {}", token.token);
        Ok(token)
    }

    /// Step two: the page the operator visits to approve access. No request
    /// is made.
    pub fn authorization_url(&self, request_token: &RequestToken) -> Url {
        let mut url = self.endpoints.authorize.clone();
        url.query_pairs_mut()
            .append_pair("oauth_token", &request_token.token);
        url
    }

    /// Step three: trade the request token and the operator's verifier code
    /// for a long-lived credential. The caller persists it.
    pub async fn exchange_for_access_token(
        &self,
        request_token: &RequestToken,
        verifier: &str,
    ) -> Result<Credential> {
        let verifier = verifier.trim();
        if verifier.is_empty() {
            return Err(RelayError::Protocol("Verifier code is empty".to_string()));
        }

        let mut url = self.endpoints.access_token.clone();
        url.query_pairs_mut().append_pair("oauth_verifier", verifier);

        let body = self
            .signed_request::<()>(Method::POST, &url, Some(request_token.pair()), &[], None)
            .await?;

        let fields = parse_form(&body);
        let credential = Credential {
            token: require_field(&fields, "oauth_token", &body)?,
            token_secret: require_field(&fields, "oauth_token_secret", &body)?,
            account_handle: fields.get("screen_name").cloned().unwrap_or_default(),
            user_id: fields.get("user_id").cloned(),
        };
        info!(target: TARGET_AUTH, "Authorized as {}", credential.account_handle);
        Ok(credential)
    }
}

/// Drives [`AuthState`] from `Unauthenticated` to `Authorized`.
///
/// A failed step leaves the state where it was.
pub struct Handshake<'a> {
    client: &'a OAuthClient,
    state: AuthState,
}

impl<'a> Handshake<'a> {
    pub fn new(client: &'a OAuthClient) -> Self {
        Handshake {
            client,
            state: AuthState::Unauthenticated,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Obtains a request token and returns the URL the operator must visit.
    pub async fn start(&mut self) -> Result<Url> {
        if let AuthState::Authorized(_) = self.state {
            return Err(RelayError::Protocol("Handshake already completed".to_string()));
        }
        let request_token = self.client.obtain_request_token().await?;
        let url = self.client.authorization_url(&request_token);
        self.state = AuthState::RequestTokenObtained(request_token);
        Ok(url)
    }

    /// Exchanges the verifier for the access credential.
    pub async fn complete(&mut self, verifier: &str) -> Result<Credential> {
        let request_token = match &self.state {
            AuthState::RequestTokenObtained(token) => token,
            AuthState::Unauthenticated => {
                return Err(RelayError::Protocol("Handshake has not been started".to_string()))
            }
            AuthState::Authorized(_) => {
                return Err(RelayError::Protocol("Handshake already completed".to_string()))
            }
        };
        let credential = self
            .client
            .exchange_for_access_token(request_token, verifier)
            .await?;
        self.state = AuthState::Authorized(credential.clone());
        Ok(credential)
    }
}
