//! Token endpoint calls
//!
//! Two form-encoded POSTs against the configured token endpoint:
//! 1. Authorization code exchange (completes the login)
//! 2. Refresh-token grant (renews the access token)
//!
//! Frappe reports failures in the JSON body (`error`, `error_description`),
//! sometimes with a 200 status, so the body is parsed regardless of status
//! and callers decide based on whether `access_token` is present.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OAuthConfig;
use crate::error::{Error, Result};

/// Token endpoint response for both grants.
#[derive(Default, Deserialize, Serialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenResponse {
    /// Provider-supplied reason, falling back to `fallback`.
    pub fn failure_message(&self, fallback: &str) -> String {
        self.error_description
            .as_deref()
            .or(self.error.as_deref())
            .filter(|s| !s.is_empty())
            .unwrap_or(fallback)
            .to_string()
    }
}

// Tokens never reach logs; only their presence is shown.
impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("error", &self.error)
            .field("error_description", &self.error_description)
            .finish()
    }
}

/// Exchange an authorization code (plus PKCE verifier) for tokens.
///
/// Transport and decode failures are `TokenExchangeError`. A decoded body
/// is returned as-is even when it carries an error instead of tokens.
pub async fn exchange_code(
    client: &reqwest::Client,
    config: &OAuthConfig,
    code: &str,
    verifier: &str,
) -> Result<TokenResponse> {
    post_form(
        client,
        &config.token_url,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("client_id", config.client_id.as_str()),
            ("code_verifier", verifier),
        ],
    )
    .await
    .map_err(Error::TokenExchangeError)
}

/// Redeem a refresh token.
///
/// Transport and decode failures are `RefreshFailed`.
pub async fn refresh_token(
    client: &reqwest::Client,
    config: &OAuthConfig,
    refresh: &str,
) -> Result<TokenResponse> {
    post_form(
        client,
        &config.token_url,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("client_id", config.client_id.as_str()),
        ],
    )
    .await
    .map_err(Error::RefreshFailed)
}

async fn post_form(
    client: &reqwest::Client,
    url: &str,
    form: &[(&str, &str)],
) -> std::result::Result<TokenResponse, String> {
    let response = client
        .post(url)
        .form(form)
        .send()
        .await
        .map_err(|e| format!("token endpoint request failed: {e}"))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("reading token endpoint response: {e}"))?;

    debug!(%status, bytes = body.len(), "token endpoint responded");

    serde_json::from_str::<TokenResponse>(&body)
        .map_err(|e| format!("token endpoint returned {status} with a non-JSON body: {e}"))
}
