//! In-process mock of the provider's token endpoint for tests

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Json, Router};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::config::OAuthConfig;
use crate::constants::DEFAULT_SCOPE;

type Responder = Arc<dyn Fn(&HashMap<String, String>) -> (StatusCode, serde_json::Value) + Send + Sync>;

#[derive(Clone)]
struct MockState {
    calls: Arc<AtomicUsize>,
    last_form: Arc<Mutex<Option<HashMap<String, String>>>>,
    responder: Responder,
    delay: Duration,
}

/// Token endpoint bound to `127.0.0.1:0` that counts calls and records the
/// last submitted form.
pub(crate) struct MockTokenEndpoint {
    pub url: String,
    calls: Arc<AtomicUsize>,
    last_form: Arc<Mutex<Option<HashMap<String, String>>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockTokenEndpoint {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&HashMap<String, String>) -> (StatusCode, serde_json::Value) + Send + Sync + 'static,
    {
        Self::start_with_delay(Duration::ZERO, responder).await
    }

    /// Like `start`, but every response is held back for `delay`.
    pub async fn start_with_delay<F>(delay: Duration, responder: F) -> Self
    where
        F: Fn(&HashMap<String, String>) -> (StatusCode, serde_json::Value) + Send + Sync + 'static,
    {
        let state = MockState {
            calls: Arc::new(AtomicUsize::new(0)),
            last_form: Arc::new(Mutex::new(None)),
            responder: Arc::new(responder),
            delay,
        };
        let calls = state.calls.clone();
        let last_form = state.last_form.clone();
        let app = Router::new()
            .route("/token", post(token_handler))
            .with_state(state);
        let (url, handle) = serve(app).await;
        Self {
            url,
            calls,
            last_form,
            handle,
        }
    }

    /// Endpoint that answers every POST with an HTML page.
    pub async fn start_html() -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/token",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (
                        StatusCode::OK,
                        [(header::CONTENT_TYPE, "text/html")],
                        "<html><body>Login</body></html>",
                    )
                }
            }),
        );
        let (url, handle) = serve(app).await;
        Self {
            url,
            calls,
            last_form: Arc::new(Mutex::new(None)),
            handle,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn last_form(&self) -> Option<HashMap<String, String>> {
        self.last_form.lock().await.clone()
    }
}

impl Drop for MockTokenEndpoint {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn token_handler(
    State(state): State<MockState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    let (status, body) = (state.responder)(&form);
    *state.last_form.lock().await = Some(form);
    (status, Json(body)).into_response()
}

async fn serve(app: Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/token"), handle)
}

pub(crate) fn test_config(token_url: &str) -> OAuthConfig {
    OAuthConfig {
        authorize_url: "https://erp.example.com/api/method/frappe.integrations.oauth2.authorize".into(),
        token_url: token_url.to_string(),
        client_id: "fm-client".into(),
        redirect_uri: "http://127.0.0.1:5173/auth/callback".into(),
        scope: DEFAULT_SCOPE.into(),
    }
}

/// Store wrapper counting every operation, to prove code paths that must not
/// touch storage.
#[derive(Default)]
pub(crate) struct CountingStore {
    pub inner: crate::store::MemorySessionStore,
    ops: AtomicUsize,
}

impl CountingStore {
    pub fn ops(&self) -> usize {
        self.ops.load(Ordering::SeqCst)
    }
}

impl crate::store::SessionStore for CountingStore {
    fn get<'a>(&'a self, key: &'a str) -> crate::store::StoreFuture<'a, Option<String>> {
        self.ops.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> crate::store::StoreFuture<'a, ()> {
        self.ops.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value)
    }

    fn clear<'a>(&'a self, keys: &'a [&'a str]) -> crate::store::StoreFuture<'a, ()> {
        self.ops.fetch_add(1, Ordering::SeqCst);
        self.inner.clear(keys)
    }
}
