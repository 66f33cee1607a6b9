//! Storage keys and protocol constants
//!
//! Key names match what the web client kept in browser local storage, so a
//! session file can be inspected with the same vocabulary.

/// Bearer credential for protected API calls
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Credential exchanged for a new access token; may rotate on every use
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// OpenID identity token, decoded for display only
pub const ID_TOKEN_KEY: &str = "id_token";

/// PKCE verifier of the in-flight login attempt
pub const CODE_VERIFIER_KEY: &str = "pkce_code_verifier";

/// CSRF state of the in-flight login attempt
pub const STATE_KEY: &str = "oauth_state";

/// Keys making up the session credentials.
pub const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, ID_TOKEN_KEY];

/// Keys making up the PKCE transaction.
pub const TRANSACTION_KEYS: [&str; 2] = [CODE_VERIFIER_KEY, STATE_KEY];

/// RFC 7636 unreserved characters allowed in a code verifier.
pub const UNRESERVED_CHARSET: &[u8; 66] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Verifier length used for every login attempt (RFC 7636 maximum).
pub const VERIFIER_LENGTH: usize = 128;

/// Length of the CSRF state token.
pub const STATE_LENGTH: usize = 32;

/// Scope requested when the configuration does not name one.
pub const DEFAULT_SCOPE: &str = "openid all";
