//! Provider endpoints and client identity consumed by the auth core

use serde::Deserialize;

use crate::constants::DEFAULT_SCOPE;
use crate::error::{Error, Result};

/// OAuth client settings for the Frappe identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    /// Authorization endpoint the browser is sent to
    pub authorize_url: String,
    /// Token endpoint for code exchange and refresh
    pub token_url: String,
    pub client_id: String,
    /// Must match the redirect URI registered with the provider
    pub redirect_uri: String,
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

impl OAuthConfig {
    /// Check that every endpoint is an absolute http(s) URL and the client id is set.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("authorize_url", &self.authorize_url),
            ("token_url", &self.token_url),
            ("redirect_uri", &self.redirect_uri),
        ] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(Error::InvalidConfig(format!(
                    "{name} must start with http:// or https://, got: {value}"
                )));
            }
            url::Url::parse(value)
                .map_err(|e| Error::InvalidConfig(format!("{name} is not a valid URL: {e}")))?;
        }

        if self.client_id.trim().is_empty() {
            return Err(Error::InvalidConfig("client_id must not be empty".into()));
        }

        Ok(())
    }
}
