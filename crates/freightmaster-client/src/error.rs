//! Error types for authenticated API calls

/// Errors surfaced to callers of the ERP API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Refresh after a 401 failed; tokens were wiped and login is required.
    #[error("session expired, please log in again")]
    SessionExpired,

    /// The server answered with something other than the expected JSON,
    /// typically a login or error page.
    #[error("server returned unexpected content: {0}")]
    UnexpectedContent(String),

    #[error("http error: {0}")]
    Http(String),

    #[error(transparent)]
    Auth(#[from] freightmaster_auth::Error),

    /// The API reported a failure (non-2xx or an `error` payload).
    #[error("{0}")]
    Api(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl Error {
    /// Whether the caller must send the user through login again.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Error::SessionExpired | Error::Auth(freightmaster_auth::Error::NoRefreshToken)
        )
    }
}

/// Result alias for API calls.
pub type Result<T> = std::result::Result<T, Error>;
