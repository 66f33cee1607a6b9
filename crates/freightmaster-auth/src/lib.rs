//! FreightMaster authentication and session core
//!
//! Implements the PKCE OAuth2 authorization-code flow against the Frappe
//! identity provider, durable session storage, and token refresh. The
//! authenticated request wrapper in `freightmaster-client` builds on the
//! `SessionManager` exported here.
//!
//! Login flow:
//! 1. `login::begin()` generates verifier, challenge and state, persists the
//!    transaction and returns the authorization URL
//! 2. The user authorizes in a browser; the provider redirects to the
//!    redirect URI with `code` and `state`
//! 3. `CallbackHandler::handle()` validates state, exchanges the code and
//!    stores `access_token` / `refresh_token` / `id_token`
//! 4. `SessionManager::refresh_after_rejection()` renews the access token
//!    when a protected call is rejected with 401

pub mod callback;
pub mod claims;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod login;
pub mod pkce;
pub mod session;
pub mod store;
pub mod token;

#[cfg(test)]
pub(crate) mod test_support;

pub use callback::{CallbackHandler, CallbackParams, CallbackState};
pub use claims::DisplayClaims;
pub use config::OAuthConfig;
pub use constants::*;
pub use error::{Error, Result};
pub use events::{SessionEvent, SessionEvents};
pub use login::AuthorizationRequest;
pub use pkce::{build_authorization_url, compute_challenge, generate_state, generate_verifier};
pub use session::SessionManager;
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use token::{TokenResponse, exchange_code, refresh_token};
