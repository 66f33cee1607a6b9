//! Loopback listener for the OAuth redirect URI
//!
//! `login` binds the host and port of the configured redirect URI and serves
//! its path. The first redirect to arrive runs a fresh `CallbackHandler`;
//! its outcome is handed back over a oneshot channel and every later
//! request is answered with 409.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{RawQuery, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use freightmaster_auth::{CallbackParams, SessionManager};
use tokio::sync::{Mutex, oneshot};
use tracing::warn;

use crate::error::{Error, Result};

/// Result of the one redirect the listener processes.
pub type CallbackOutcome = freightmaster_auth::Result<()>;

#[derive(Clone)]
struct CallbackServerState {
    session: Arc<SessionManager>,
    done: Arc<Mutex<Option<oneshot::Sender<CallbackOutcome>>>>,
}

/// Where to listen for the redirect, derived from the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    pub addr: (String, u16),
    pub path: String,
}

impl RedirectTarget {
    /// Only loopback redirect URIs can be served by this process.
    pub fn from_redirect_uri(redirect_uri: &str) -> Result<Self> {
        let url = url::Url::parse(redirect_uri)
            .map_err(|_| Error::NonLoopbackRedirect(redirect_uri.to_string()))?;

        let is_loopback = match url.host() {
            Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
            Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
            Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
            None => false,
        };
        let port = url.port_or_known_default();
        let (true, Some(port)) = (is_loopback, port) else {
            return Err(Error::NonLoopbackRedirect(redirect_uri.to_string()));
        };

        let host = match url.host() {
            Some(url::Host::Ipv6(ip)) => ip.to_string(),
            _ => url.host_str().unwrap_or("127.0.0.1").to_string(),
        };

        Ok(Self {
            addr: (host, port),
            path: url.path().to_string(),
        })
    }
}

/// Router serving `path`. The receiver resolves with the first outcome.
pub fn build_callback_router(
    session: Arc<SessionManager>,
    path: &str,
) -> (Router, oneshot::Receiver<CallbackOutcome>) {
    let (tx, rx) = oneshot::channel();
    let state = CallbackServerState {
        session,
        done: Arc::new(Mutex::new(Some(tx))),
    };
    let router = Router::new()
        .route(path, get(handle_redirect))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .with_state(state);
    (router, rx)
}

/// Upper bound on waiting for the browser's connection to finish after the outcome.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Running redirect listener.
pub struct CallbackListener {
    pub addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl CallbackListener {
    /// Stop accepting, let the in-flight response reach the browser, then exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if tokio::time::timeout(DRAIN_TIMEOUT, self.handle).await.is_err() {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "callback listener did not drain in time"
            );
        }
    }
}

/// Bind the redirect target and serve `router` until shut down.
pub async fn serve(target: &RedirectTarget, router: Router) -> std::io::Result<CallbackListener> {
    let listener = tokio::net::TcpListener::bind((target.addr.0.as_str(), target.addr.1)).await?;
    let addr = listener.local_addr()?;

    let (shutdown, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = result {
            warn!(error = %e, "callback listener stopped");
        }
    });

    Ok(CallbackListener {
        addr,
        shutdown,
        handle,
    })
}

async fn handle_redirect(
    State(state): State<CallbackServerState>,
    RawQuery(query): RawQuery,
) -> Response {
    let mut done = state.done.lock().await;
    let Some(tx) = done.take() else {
        return page(
            StatusCode::CONFLICT,
            "Already finished",
            "This login attempt has already been processed. You can close this window.",
        );
    };

    let params = CallbackParams::from_query(query.as_deref().unwrap_or_default());
    let mut handler = state.session.callback_handler();
    let outcome = handler.handle(&params).await;

    let response = match &outcome {
        Ok(()) => page(
            StatusCode::OK,
            "Signed in",
            "FreightMaster is signed in. You can close this window and return to the terminal.",
        ),
        Err(e) if e.is_integrity() => page(StatusCode::BAD_REQUEST, "Login failed", &e.to_string()),
        Err(e) => page(StatusCode::BAD_GATEWAY, "Login failed", &e.to_string()),
    };

    if tx.send(outcome).is_err() {
        warn!("login command no longer waiting for the callback outcome");
    }
    response
}

fn page(status: StatusCode, title: &str, message: &str) -> Response {
    let body = format!(
        "<!doctype html><html><head><title>{title}</title></head>\
         <body><h1>{title}</h1><p>{}</p></body></html>",
        escape_html(message)
    );
    (status, [(header::CONTENT_TYPE, "text/html; charset=utf-8")], body).into_response()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
