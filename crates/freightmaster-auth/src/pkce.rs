//! PKCE (Proof Key for Code Exchange) per RFC 7636
//!
//! The verifier stays on this side and is sent with the code exchange; the
//! S256 challenge travels in the authorization URL so the provider can tie
//! the returned code to whoever started the flow.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

use crate::config::OAuthConfig;
use crate::constants::{STATE_LENGTH, UNRESERVED_CHARSET};
use crate::error::{Error, Result};

/// Largest multiple of the charset size that fits in a byte. Bytes at or
/// above it are discarded so every character is equally likely.
const REJECTION_LIMIT: u8 = (256 / UNRESERVED_CHARSET.len() * UNRESERVED_CHARSET.len()) as u8;

/// Generate a code verifier of exactly `length` characters.
///
/// Characters come from the 66-character unreserved set, drawn from the
/// thread-local CSPRNG.
pub fn generate_verifier(length: usize) -> String {
    random_unreserved(length)
}

/// Generate the opaque CSRF `state` bound to one login attempt.
pub fn generate_state() -> String {
    random_unreserved(STATE_LENGTH)
}

/// Compute the S256 code challenge: `BASE64URL(SHA256(verifier))`, no padding.
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Build the authorization-request URL for the configured provider.
pub fn build_authorization_url(config: &OAuthConfig, state: &str, challenge: &str) -> Result<String> {
    let url = url::Url::parse_with_params(
        &config.authorize_url,
        &[
            ("response_type", "code"),
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("scope", config.scope.as_str()),
            ("state", state),
            ("code_challenge", challenge),
            ("code_challenge_method", "S256"),
        ],
    )
    .map_err(|e| Error::InvalidConfig(format!("authorize_url is not a valid URL: {e}")))?;
    Ok(url.into())
}

fn random_unreserved(length: usize) -> String {
    let mut rng = rand::rng();
    let mut out = String::with_capacity(length);
    let mut buf = [0u8; 64];

    while out.len() < length {
        rng.fill(&mut buf);
        for &byte in &buf {
            if byte >= REJECTION_LIMIT {
                continue;
            }
            out.push(UNRESERVED_CHARSET[usize::from(byte) % UNRESERVED_CHARSET.len()] as char);
            if out.len() == length {
                break;
            }
        }
    }

    out
}
