//! Configuration types and loading
//!
//! Precedence: CLI args > env vars > config file > defaults. The file
//! carries no secrets; tokens only ever live in the session store.

use freightmaster_auth::{FileSessionStore, OAuthConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub oauth: OAuthConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// ERP site the data commands talk to
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
}

/// Where the session lives and how long `login` waits for the browser
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// Session file; defaults to the platform data directory
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: None,
            login_timeout_secs: default_login_timeout(),
        }
    }
}

fn default_login_timeout() -> u64 {
    300
}

/// Environment variables overlaid on the file.
const ENV_OVERRIDES: &[&str] = &[
    "FRAPPE_OAUTH_AUTHORIZE_URL",
    "FRAPPE_OAUTH_TOKEN_URL",
    "FRAPPE_CLIENT_ID",
    "FRAPPE_REDIRECT_URI",
    "FRAPPE_SCOPE",
    "FRAPPE_API_BASE_URL",
];

impl Config {
    /// Load configuration from a TOML file, overlay environment variables,
    /// then validate.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        for &key in ENV_OVERRIDES {
            let Ok(value) = std::env::var(key) else {
                continue;
            };
            let field = match key {
                "FRAPPE_OAUTH_AUTHORIZE_URL" => &mut self.oauth.authorize_url,
                "FRAPPE_OAUTH_TOKEN_URL" => &mut self.oauth.token_url,
                "FRAPPE_CLIENT_ID" => &mut self.oauth.client_id,
                "FRAPPE_REDIRECT_URI" => &mut self.oauth.redirect_uri,
                "FRAPPE_SCOPE" => &mut self.oauth.scope,
                "FRAPPE_API_BASE_URL" => &mut self.api.base_url,
                _ => continue,
            };
            *field = value;
        }
    }

    fn validate(&self) -> common::Result<()> {
        self.oauth
            .validate()
            .map_err(|e| common::Error::Config(e.to_string()))?;

        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://") {
            return Err(common::Error::Config(format!(
                "api.base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.session.login_timeout_secs == 0 {
            return Err(common::Error::Config(
                "login_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Session file location: configured path, else the platform default.
    pub fn session_path(&self) -> common::Result<PathBuf> {
        self.session
            .path
            .clone()
            .or_else(FileSessionStore::default_path)
            .ok_or_else(|| {
                common::Error::Config(
                    "no data directory on this platform; set session.path".into(),
                )
            })
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.session.login_timeout_secs)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("freightmaster.toml")
    }
}
