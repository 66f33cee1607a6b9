//! In-process ERP mock for tests: `/token` plus a catch-all API handler

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use freightmaster_auth::{
    ACCESS_TOKEN_KEY, ID_TOKEN_KEY, MemorySessionStore, OAuthConfig, REFRESH_TOKEN_KEY,
    SessionManager,
};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::client::AuthenticatedClient;

/// What the API handler sees: path+query and bearer token.
type ApiResponder = Arc<dyn Fn(&str, Option<&str>) -> (StatusCode, &'static str, String) + Send + Sync>;
type TokenResponder = Arc<dyn Fn() -> (StatusCode, serde_json::Value) + Send + Sync>;

/// One request received by the API handler.
#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Recorded {
    pub fn bearer(&self) -> Option<&str> {
        bearer(&self.headers)
    }
}

#[derive(Clone)]
struct MockState {
    api: ApiResponder,
    token: TokenResponder,
    token_delay: Duration,
    api_calls: Arc<AtomicUsize>,
    token_calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

pub(crate) struct MockErp {
    pub base_url: String,
    api_calls: Arc<AtomicUsize>,
    token_calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Recorded>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockErp {
    pub async fn start<A, T>(api: A, token: T) -> Self
    where
        A: Fn(&str, Option<&str>) -> (StatusCode, &'static str, String) + Send + Sync + 'static,
        T: Fn() -> (StatusCode, serde_json::Value) + Send + Sync + 'static,
    {
        Self::start_with_token_delay(Duration::ZERO, api, token).await
    }

    /// Like `start`, but the token endpoint holds every response for `delay`.
    pub async fn start_with_token_delay<A, T>(delay: Duration, api: A, token: T) -> Self
    where
        A: Fn(&str, Option<&str>) -> (StatusCode, &'static str, String) + Send + Sync + 'static,
        T: Fn() -> (StatusCode, serde_json::Value) + Send + Sync + 'static,
    {
        let state = MockState {
            api: Arc::new(api),
            token: Arc::new(token),
            token_delay: delay,
            api_calls: Arc::new(AtomicUsize::new(0)),
            token_calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let api_calls = state.api_calls.clone();
        let token_calls = state.token_calls.clone();
        let requests = state.requests.clone();

        let app = Router::new()
            .route("/token", post(token_handler))
            .fallback(api_handler)
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            api_calls,
            token_calls,
            requests,
            handle,
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}/token", self.base_url)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn api_calls(&self) -> usize {
        self.api_calls.load(Ordering::SeqCst)
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().await.clone()
    }
}

impl Drop for MockErp {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn token_handler(State(state): State<MockState>) -> Response {
    state.token_calls.fetch_add(1, Ordering::SeqCst);
    if !state.token_delay.is_zero() {
        tokio::time::sleep(state.token_delay).await;
    }
    let (status, body) = (state.token)();
    (status, axum::Json(body)).into_response()
}

async fn api_handler(
    State(state): State<MockState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.api_calls.fetch_add(1, Ordering::SeqCst);
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_default();
    let (status, content_type, payload) = (state.api)(&path, bearer(&headers));
    state.requests.lock().await.push(Recorded {
        uri: path,
        headers,
        body,
    });
    (status, [(header::CONTENT_TYPE, content_type)], payload).into_response()
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

pub(crate) fn json(status: StatusCode, body: serde_json::Value) -> (StatusCode, &'static str, String) {
    (status, "application/json", body.to_string())
}

pub(crate) fn unauthorized() -> (StatusCode, &'static str, String) {
    json(
        StatusCode::UNAUTHORIZED,
        serde_json::json!({"exc_type": "AuthenticationError"}),
    )
}

pub(crate) fn rotated_tokens() -> (StatusCode, serde_json::Value) {
    (
        StatusCode::OK,
        serde_json::json!({"access_token": "A1", "refresh_token": "R1"}),
    )
}

pub(crate) fn rejected_refresh() -> (StatusCode, serde_json::Value) {
    (
        StatusCode::BAD_REQUEST,
        serde_json::json!({"error": "invalid_grant", "error_description": "Refresh token revoked"}),
    )
}

/// Signed-in session (`A0` / `R0` / `I0`) against the mock's token endpoint.
pub(crate) fn signed_in(mock: &MockErp) -> (Arc<MemorySessionStore>, Arc<SessionManager>) {
    let store = Arc::new(MemorySessionStore::with_entries([
        (ACCESS_TOKEN_KEY, "A0"),
        (REFRESH_TOKEN_KEY, "R0"),
        (ID_TOKEN_KEY, "I0"),
    ]));
    let config = OAuthConfig {
        authorize_url: mock.url("/api/method/frappe.integrations.oauth2.authorize"),
        token_url: mock.token_url(),
        client_id: "fm-client".into(),
        redirect_uri: "http://127.0.0.1:5173/auth/callback".into(),
        scope: "openid all".into(),
    };
    let session = Arc::new(SessionManager::new(
        reqwest::Client::new(),
        config,
        store.clone(),
    ));
    (store, session)
}

pub(crate) fn client_for(session: &Arc<SessionManager>) -> AuthenticatedClient {
    AuthenticatedClient::new(reqwest::Client::new(), session.clone())
}
