//! Authenticated request wrapper
//!
//! Every protected call goes through [`AuthenticatedClient::send`]. The
//! request is held as an [`ApiRequest`] rather than a consumed
//! `reqwest::RequestBuilder` so it can be issued a second time after a
//! refresh.

use std::sync::Arc;

use bytes::Bytes;
use freightmaster_auth::SessionManager;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Response, StatusCode};
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};

/// A replayable HTTP request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// JSON body with a matching `Content-Type`.
    pub fn json(self, payload: &serde_json::Value) -> Self {
        self.header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(payload.to_string())
    }
}

/// HTTP client that authenticates requests from the session store.
#[derive(Clone)]
pub struct AuthenticatedClient {
    http: reqwest::Client,
    session: Arc<SessionManager>,
}

impl AuthenticatedClient {
    pub fn new(http: reqwest::Client, session: Arc<SessionManager>) -> Self {
        Self { http, session }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Send with one refresh-and-retry on 401.
    pub async fn send(&self, request: ApiRequest) -> Result<Response> {
        self.send_with_retry(request, true).await
    }

    /// Send `request`, refreshing and re-issuing once on 401 when
    /// `allow_retry` is set.
    ///
    /// A 401 on the re-issued request, or any 401 with `allow_retry` unset,
    /// is handed back to the caller. Other statuses pass through unchanged,
    /// except a 2xx HTML page, which is `UnexpectedContent`.
    pub async fn send_with_retry(&self, request: ApiRequest, allow_retry: bool) -> Result<Response> {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        self.dispatch(&request, allow_retry, request_id).await
    }

    #[instrument(skip_all, fields(request_id = %request_id, method = %request.method, url = %request.url))]
    async fn dispatch(
        &self,
        request: &ApiRequest,
        allow_retry: bool,
        request_id: String,
    ) -> Result<Response> {
        let token = self.session.access_token().await?;
        let response = self.issue(request, token.as_deref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED || !allow_retry {
            return reject_html(response);
        }

        debug!("access token rejected, refreshing");
        let fresh = match self.session.refresh_after_rejection(token.as_deref()).await {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(error = %e, "refresh failed, ending session");
                self.session.expire().await?;
                return Err(Error::SessionExpired);
            }
        };

        let retried = self.issue(request, Some(&fresh)).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!("request rejected again after refresh");
        }
        reject_html(retried)
    }

    async fn issue(&self, request: &ApiRequest, token: Option<&str>) -> Result<Response> {
        let mut headers = request.headers.clone();
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| Error::Http("stored access token is not a valid header value".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = self
            .http
            .request(request.method.clone(), &request.url)
            .headers(headers);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Http(format!("request failed: {e}")))?;

        let status = response.status();
        metrics::counter!("freightmaster_api_requests_total", "status" => status.as_u16().to_string())
            .increment(1);
        debug!(%status, "api responded");
        Ok(response)
    }
}

/// A 2xx HTML page means the API was not reached (typically a login page).
fn reject_html(response: Response) -> Result<Response> {
    let is_html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("text/html"));

    if response.status().is_success() && is_html {
        warn!(status = %response.status(), "received HTML instead of JSON");
        return Err(Error::UnexpectedContent(
            "server returned HTML instead of JSON; check server status and authentication".into(),
        ));
    }
    Ok(response)
}
