//! Authorization redirect
//!
//! Starts a login attempt: creates and persists the PKCE transaction, then
//! hands back the provider URL. Navigating there (opening a browser) is the
//! caller's job, so persisting always happens before anything leaves the
//! process.

use tracing::info;

use crate::config::OAuthConfig;
use crate::constants::{CODE_VERIFIER_KEY, STATE_KEY, VERIFIER_LENGTH};
use crate::error::Result;
use crate::pkce::{build_authorization_url, compute_challenge, generate_state, generate_verifier};
use crate::store::SessionStore;

/// A started login attempt.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// Full `<authorize_url>?...` URL to navigate to
    pub url: String,
    /// CSRF state the callback must echo back
    pub state: String,
}

/// Begin a login attempt.
///
/// Any earlier unfinished attempt is overwritten and can no longer complete.
pub async fn begin(config: &OAuthConfig, store: &dyn SessionStore) -> Result<AuthorizationRequest> {
    let verifier = generate_verifier(VERIFIER_LENGTH);
    let challenge = compute_challenge(&verifier);
    let state = generate_state();

    store.set(CODE_VERIFIER_KEY, verifier).await?;
    store.set(STATE_KEY, state.clone()).await?;

    let url = build_authorization_url(config, &state, &challenge)?;
    info!(authorize_url = %config.authorize_url, "login attempt started");

    Ok(AuthorizationRequest { url, state })
}
