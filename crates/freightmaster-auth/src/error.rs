//! Error types for login, callback, storage and refresh operations

/// Errors from the authentication core.
///
/// The first three variants are integrity failures detected before any
/// network call. None of them are retried; the user restarts the login.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No code found in callback URL.")]
    MissingAuthorizationCode,

    #[error("Invalid state parameter. Possible CSRF detected.")]
    StateMismatch,

    #[error("No PKCE code verifier found. Please try logging in again.")]
    MissingVerifier,

    /// The token endpoint answered without an access token.
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// The token endpoint could not be reached or answered with something
    /// other than JSON.
    #[error("Error exchanging code for token: {0}")]
    TokenExchangeError(String),

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("callback already handled by this instance")]
    CallbackCompleted,

    #[error("invalid OAuth configuration: {0}")]
    InvalidConfig(String),

    #[error("session store error: {0}")]
    Store(String),

    #[error("session file parse error: {0}")]
    StoreParse(String),
}

impl Error {
    /// Integrity errors are raised before the token endpoint is contacted.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Error::MissingAuthorizationCode | Error::StateMismatch | Error::MissingVerifier
        )
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_errors_are_classified() {
        assert!(Error::StateMismatch.is_integrity());
        assert!(Error::MissingVerifier.is_integrity());
        assert!(Error::MissingAuthorizationCode.is_integrity());
        assert!(!Error::NoRefreshToken.is_integrity());
        assert!(!Error::TokenExchangeFailed("x".into()).is_integrity());
    }

    #[test]
    fn provider_description_is_surfaced() {
        let err = Error::TokenExchangeFailed("Invalid grant".into());
        assert!(err.to_string().contains("Invalid grant"));
        let err = Error::RefreshFailed("refresh token revoked".into());
        assert!(err.to_string().contains("refresh token revoked"));
    }
}
