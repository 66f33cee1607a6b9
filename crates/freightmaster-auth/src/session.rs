//! Session manager: refresh, expiry and logout over the session store
//!
//! Refreshes are serialized behind a gate so that concurrent callers whose
//! requests were all rejected with the same stale token trigger a single
//! call to the token endpoint. Providers rotate refresh tokens on use, so a
//! second independent refresh would present an already-invalidated token and
//! end the session for no reason.

use std::sync::Arc;

use common::Secret;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::callback::CallbackHandler;
use crate::claims::DisplayClaims;
use crate::config::OAuthConfig;
use crate::constants::{
    ACCESS_TOKEN_KEY, ID_TOKEN_KEY, REFRESH_TOKEN_KEY, SESSION_KEYS, TRANSACTION_KEYS,
};
use crate::error::{Error, Result};
use crate::events::{SessionEvent, SessionEvents};
use crate::login::{self, AuthorizationRequest};
use crate::store::SessionStore;
use crate::token::{self, TokenResponse};

const REFRESH_METRIC: &str = "freightmaster_token_refresh_total";

/// Owns the store handle, provider config and HTTP client for one user session.
pub struct SessionManager {
    http: reqwest::Client,
    config: Arc<OAuthConfig>,
    store: Arc<dyn SessionStore>,
    events: SessionEvents,
    refresh_gate: Mutex<()>,
}

impl SessionManager {
    pub fn new(http: reqwest::Client, config: OAuthConfig, store: Arc<dyn SessionStore>) -> Self {
        Self {
            http,
            config: Arc::new(config),
            store,
            events: SessionEvents::new(),
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    /// Start a login attempt (see [`login::begin`]).
    pub async fn begin_login(&self) -> Result<AuthorizationRequest> {
        login::begin(&self.config, self.store.as_ref()).await
    }

    /// Fresh handler for one provider redirect.
    pub fn callback_handler(&self) -> CallbackHandler {
        CallbackHandler::new(
            self.http.clone(),
            self.config.clone(),
            self.store.clone(),
            self.events.clone(),
        )
    }

    /// Stored access token, if any.
    pub async fn access_token(&self) -> Result<Option<String>> {
        self.store.get(ACCESS_TOKEN_KEY).await
    }

    /// Whether a non-empty access token is stored. Does not contact the provider.
    pub async fn is_authenticated(&self) -> Result<bool> {
        Ok(self
            .access_token()
            .await?
            .is_some_and(|token| !token.is_empty()))
    }

    /// Redeem the stored refresh token and persist the result.
    ///
    /// Overwrites `access_token`; overwrites `refresh_token` and `id_token`
    /// only when the provider returns new ones. No retry: a failure here is
    /// final for the request that triggered it.
    pub async fn refresh(&self) -> Result<String> {
        let refresh = match self.store.get(REFRESH_TOKEN_KEY).await? {
            Some(r) if !r.is_empty() => Secret::new(r),
            _ => {
                metrics::counter!(REFRESH_METRIC, "outcome" => "no_refresh_token").increment(1);
                debug!("no refresh token stored");
                return Err(Error::NoRefreshToken);
            }
        };

        let response = match token::refresh_token(&self.http, &self.config, refresh.expose()).await {
            Ok(r) => r,
            Err(e) => {
                metrics::counter!(REFRESH_METRIC, "outcome" => "error").increment(1);
                warn!(error = %e, "token refresh request failed");
                return Err(e);
            }
        };

        if response.access_token.as_deref().is_none_or(str::is_empty) {
            let message = response.failure_message("Failed to refresh access token");
            metrics::counter!(REFRESH_METRIC, "outcome" => "rejected").increment(1);
            warn!(error = %message, "provider rejected refresh token");
            return Err(Error::RefreshFailed(message));
        }

        let TokenResponse {
            access_token,
            refresh_token,
            id_token,
            ..
        } = response;
        let access = access_token.unwrap_or_default();

        self.store.set(ACCESS_TOKEN_KEY, access.clone()).await?;
        let rotated = refresh_token.is_some();
        if let Some(new_refresh) = refresh_token {
            self.store.set(REFRESH_TOKEN_KEY, new_refresh).await?;
        }
        if let Some(new_id) = id_token {
            self.store.set(ID_TOKEN_KEY, new_id).await?;
        }

        metrics::counter!(REFRESH_METRIC, "outcome" => "success").increment(1);
        info!(rotated, "access token refreshed");
        Ok(access)
    }

    /// Refresh after a protected call was rejected while using `rejected`.
    ///
    /// Only one refresh runs at a time. A caller that waited at the gate and
    /// finds a different, non-empty access token in the store reuses it
    /// instead of refreshing again. After a failed refresh the tokens are
    /// gone, so waiters fail with `NoRefreshToken` without a network call.
    pub async fn refresh_after_rejection(&self, rejected: Option<&str>) -> Result<String> {
        let _gate = self.refresh_gate.lock().await;

        if let Some(current) = self.store.get(ACCESS_TOKEN_KEY).await?
            && !current.is_empty()
            && Some(current.as_str()) != rejected
        {
            debug!("access token already renewed by a concurrent caller");
            return Ok(current);
        }

        self.refresh().await
    }

    /// Terminate the session after an unrecoverable 401.
    pub async fn expire(&self) -> Result<()> {
        self.store.clear(&SESSION_KEYS).await?;
        metrics::counter!("freightmaster_session_expired_total").increment(1);
        warn!("session expired, login required");
        self.events.emit(SessionEvent::Expired);
        Ok(())
    }

    /// Sign out: drop the session credentials and any unfinished login.
    pub async fn logout(&self) -> Result<()> {
        self.store.clear(&SESSION_KEYS).await?;
        self.store.clear(&TRANSACTION_KEYS).await?;
        info!("signed out");
        self.events.emit(SessionEvent::LoggedOut);
        Ok(())
    }

    /// Unverified identity claims for display; `None` without an id token.
    pub async fn display_claims(&self) -> Result<Option<DisplayClaims>> {
        Ok(self
            .store
            .get(ID_TOKEN_KEY)
            .await?
            .filter(|t| !t.is_empty())
            .map(|t| DisplayClaims::decode(&t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CODE_VERIFIER_KEY, STATE_KEY};
    use crate::store::MemorySessionStore;
    use crate::test_support::{MockTokenEndpoint, test_config};
    use axum::http::StatusCode;
    use std::time::Duration;

    fn manager(token_url: &str, store: Arc<MemorySessionStore>) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(
            reqwest::Client::new(),
            test_config(token_url),
            store,
        ))
    }

    fn signed_in_store() -> Arc<MemorySessionStore> {
        Arc::new(MemorySessionStore::with_entries([
            (ACCESS_TOKEN_KEY, "A0"),
            (REFRESH_TOKEN_KEY, "R0"),
            (ID_TOKEN_KEY, "I0"),
        ]))
    }

    #[tokio::test]
    async fn refresh_honors_rotation() {
        let endpoint = MockTokenEndpoint::start(|form| {
            assert_eq!(form["refresh_token"], "R0");
            (
                StatusCode::OK,
                serde_json::json!({"access_token": "A1", "refresh_token": "R1"}),
            )
        })
        .await;
        let store = signed_in_store();
        let session = manager(&endpoint.url, store.clone());

        assert_eq!(session.refresh().await.unwrap(), "A1");

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot[ACCESS_TOKEN_KEY], "A1");
        assert_eq!(snapshot[REFRESH_TOKEN_KEY], "R1");
        assert!(!snapshot.values().any(|v| v == "R0"), "old refresh token must be gone");
        assert_eq!(snapshot[ID_TOKEN_KEY], "I0");
    }

    #[tokio::test]
    async fn refresh_without_rotation_keeps_refresh_token() {
        let endpoint = MockTokenEndpoint::start(|_| {
            (StatusCode::OK, serde_json::json!({"access_token": "A1", "id_token": "I1"}))
        })
        .await;
        let store = signed_in_store();
        let session = manager(&endpoint.url, store.clone());

        session.refresh().await.unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot[REFRESH_TOKEN_KEY], "R0");
        assert_eq!(snapshot[ID_TOKEN_KEY], "I1");
    }

    #[tokio::test]
    async fn refresh_without_stored_token_skips_network() {
        let endpoint = MockTokenEndpoint::start(|_| {
            (StatusCode::OK, serde_json::json!({"access_token": "A1"}))
        })
        .await;
        let store = Arc::new(MemorySessionStore::with_entries([(ACCESS_TOKEN_KEY, "A0")]));
        let session = manager(&endpoint.url, store);

        assert!(matches!(session.refresh().await, Err(Error::NoRefreshToken)));
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn rejected_refresh_surfaces_description_and_leaves_store() {
        let endpoint = MockTokenEndpoint::start(|_| {
            (
                StatusCode::BAD_REQUEST,
                serde_json::json!({"error": "invalid_grant", "error_description": "Refresh token revoked"}),
            )
        })
        .await;
        let store = signed_in_store();
        let session = manager(&endpoint.url, store.clone());

        match session.refresh().await {
            Err(Error::RefreshFailed(msg)) => assert_eq!(msg, "Refresh token revoked"),
            other => panic!("expected RefreshFailed, got {other:?}"),
        }
        assert_eq!(store.snapshot().await[ACCESS_TOKEN_KEY], "A0");
    }

    #[tokio::test]
    async fn rejected_refresh_without_description_is_generic() {
        let endpoint = MockTokenEndpoint::start(|_| (StatusCode::OK, serde_json::json!({}))).await;
        let session = manager(&endpoint.url, signed_in_store());

        match session.refresh().await {
            Err(Error::RefreshFailed(msg)) => assert_eq!(msg, "Failed to refresh access token"),
            other => panic!("expected RefreshFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_rejections_share_one_refresh() {
        let endpoint = MockTokenEndpoint::start_with_delay(Duration::from_millis(100), |_| {
            (
                StatusCode::OK,
                serde_json::json!({"access_token": "A1", "refresh_token": "R1"}),
            )
        })
        .await;
        let session = manager(&endpoint.url, signed_in_store());

        let mut handles = vec![];
        for _ in 0..5 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                session.refresh_after_rejection(Some("A0")).await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), "A1");
        }

        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn already_renewed_token_is_reused() {
        let endpoint = MockTokenEndpoint::start(|_| {
            (StatusCode::OK, serde_json::json!({"access_token": "A2"}))
        })
        .await;
        let store = signed_in_store();
        store.set(ACCESS_TOKEN_KEY, "A1".into()).await.unwrap();
        let session = manager(&endpoint.url, store);

        assert_eq!(session.refresh_after_rejection(Some("A0")).await.unwrap(), "A1");
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn waiters_after_failed_refresh_do_not_call_endpoint() {
        let endpoint = MockTokenEndpoint::start(|_| {
            (StatusCode::UNAUTHORIZED, serde_json::json!({"error": "invalid_grant"}))
        })
        .await;
        let store = signed_in_store();
        let session = manager(&endpoint.url, store.clone());

        assert!(session.refresh_after_rejection(Some("A0")).await.is_err());
        session.expire().await.unwrap();

        let err = session.refresh_after_rejection(Some("A0")).await.unwrap_err();
        assert!(matches!(err, Error::NoRefreshToken));
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn expire_wipes_credentials_and_notifies() {
        let store = signed_in_store();
        let session = manager("http://127.0.0.1:9/token", store.clone());
        let mut rx = session.events().subscribe();

        session.expire().await.unwrap();

        assert!(store.snapshot().await.is_empty());
        assert!(!session.is_authenticated().await.unwrap());
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::Expired);
    }

    #[tokio::test]
    async fn logout_clears_session_and_pending_login() {
        let store = signed_in_store();
        store.set(CODE_VERIFIER_KEY, "v".into()).await.unwrap();
        store.set(STATE_KEY, "s".into()).await.unwrap();
        store.set("theme", "dark".into()).await.unwrap();
        let session = manager("http://127.0.0.1:9/token", store.clone());
        let mut rx = session.events().subscribe();

        session.logout().await.unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["theme"], "dark");
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::LoggedOut);
    }

    #[tokio::test]
    async fn authentication_requires_non_empty_token() {
        let store = Arc::new(MemorySessionStore::with_entries([(ACCESS_TOKEN_KEY, "")]));
        let session = manager("http://127.0.0.1:9/token", store.clone());
        assert!(!session.is_authenticated().await.unwrap());

        store.set(ACCESS_TOKEN_KEY, "A1".into()).await.unwrap();
        assert!(session.is_authenticated().await.unwrap());
    }

    #[tokio::test]
    async fn display_claims_absent_without_id_token() {
        let store = Arc::new(MemorySessionStore::with_entries([(ID_TOKEN_KEY, "")]));
        let session = manager("http://127.0.0.1:9/token", store);
        assert!(session.display_claims().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn begin_login_persists_through_manager_store() {
        let store = Arc::new(MemorySessionStore::new());
        let session = manager("http://127.0.0.1:9/token", store.clone());

        let request = session.begin_login().await.unwrap();

        assert_eq!(store.snapshot().await[STATE_KEY], request.state);
    }
}
