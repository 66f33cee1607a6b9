//! Redirect-URI callback handling
//!
//! Completes a login attempt when the provider redirects back with `code`
//! and `state`. Integrity checks (code present, state matches, verifier
//! stored) run before any network call; the code exchange then stores the
//! session credentials.
//!
//! States: `Idle → Validating → Exchanging → {Authenticated | Failed}`.
//! Both end states are terminal for a handler instance; a new redirect gets
//! a new handler.

use std::sync::Arc;

use common::Secret;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::OAuthConfig;
use crate::constants::{
    ACCESS_TOKEN_KEY, CODE_VERIFIER_KEY, ID_TOKEN_KEY, REFRESH_TOKEN_KEY, STATE_KEY,
    TRANSACTION_KEYS,
};
use crate::error::{Error, Result};
use crate::events::{SessionEvent, SessionEvents};
use crate::store::SessionStore;
use crate::token::{self, TokenResponse};

/// Query parameters the provider appends to the redirect URI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl CallbackParams {
    /// Parse from a raw query string (leading `?` optional). The first
    /// occurrence of each parameter wins.
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            match key.as_ref() {
                "code" if params.code.is_none() => params.code = Some(value.into_owned()),
                "state" if params.state.is_none() => params.state = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackState {
    Idle,
    Validating,
    Exchanging,
    Authenticated,
    Failed { reason: String },
}

impl CallbackState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallbackState::Authenticated | CallbackState::Failed { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            CallbackState::Idle => "idle",
            CallbackState::Validating => "validating",
            CallbackState::Exchanging => "exchanging",
            CallbackState::Authenticated => "authenticated",
            CallbackState::Failed { .. } => "failed",
        }
    }
}

/// One-shot handler for a single provider redirect.
pub struct CallbackHandler {
    http: reqwest::Client,
    config: Arc<OAuthConfig>,
    store: Arc<dyn SessionStore>,
    events: SessionEvents,
    state: CallbackState,
}

impl CallbackHandler {
    pub fn new(
        http: reqwest::Client,
        config: Arc<OAuthConfig>,
        store: Arc<dyn SessionStore>,
        events: SessionEvents,
    ) -> Self {
        Self {
            http,
            config,
            store,
            events,
            state: CallbackState::Idle,
        }
    }

    pub fn state(&self) -> &CallbackState {
        &self.state
    }

    /// Validate the redirect and exchange the code for tokens.
    ///
    /// The PKCE transaction is cleared once the exchange has been attempted,
    /// whatever its outcome. Failures before that point leave it in place.
    pub async fn handle(&mut self, params: &CallbackParams) -> Result<()> {
        if self.state.is_terminal() {
            return Err(Error::CallbackCompleted);
        }

        let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
            return self.fail(Error::MissingAuthorizationCode);
        };

        self.transition(CallbackState::Validating);

        let stored_state = match self.store.get(STATE_KEY).await {
            Ok(s) => s,
            Err(e) => return self.fail(e),
        };
        match (params.state.as_deref(), stored_state.as_deref()) {
            (Some(received), Some(expected)) if received == expected => {}
            _ => return self.fail(Error::StateMismatch),
        }

        let verifier = match self.store.get(CODE_VERIFIER_KEY).await {
            Ok(Some(v)) if !v.is_empty() => Secret::new(v),
            Ok(_) => return self.fail(Error::MissingVerifier),
            Err(e) => return self.fail(e),
        };

        self.transition(CallbackState::Exchanging);
        let outcome = self.exchange(code, verifier.expose()).await;

        if let Err(e) = self.store.clear(&TRANSACTION_KEYS).await {
            warn!(error = %e, "failed to clear PKCE transaction");
        }

        match outcome {
            Ok(()) => {
                self.transition(CallbackState::Authenticated);
                info!("login completed");
                self.events.emit(SessionEvent::Authenticated);
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    async fn exchange(&self, code: &str, verifier: &str) -> Result<()> {
        let response = token::exchange_code(&self.http, &self.config, code, verifier).await?;

        if response.access_token.as_deref().is_none_or(str::is_empty) {
            return Err(Error::TokenExchangeFailed(
                response.failure_message("Failed to obtain access token."),
            ));
        }

        let TokenResponse {
            access_token,
            refresh_token,
            id_token,
            ..
        } = response;

        self.store
            .set(ACCESS_TOKEN_KEY, access_token.unwrap_or_default())
            .await?;
        match refresh_token {
            Some(refresh) => self.store.set(REFRESH_TOKEN_KEY, refresh).await?,
            None => {
                debug!("provider issued no refresh token");
                self.store.clear(&[REFRESH_TOKEN_KEY]).await?
            }
        }
        self.store
            .set(ID_TOKEN_KEY, id_token.unwrap_or_default())
            .await?;
        Ok(())
    }

    fn transition(&mut self, next: CallbackState) {
        debug!(from = self.state.label(), to = next.label(), "callback state");
        self.state = next;
    }

    fn fail(&mut self, error: Error) -> Result<()> {
        warn!(error = %error, stage = self.state.label(), "login callback failed");
        self.state = CallbackState::Failed {
            reason: error.to_string(),
        };
        Err(error)
    }
}
