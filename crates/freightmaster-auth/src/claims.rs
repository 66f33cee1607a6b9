//! Display-only identity claims
//!
//! Decodes the payload of the stored `id_token` without verifying its
//! signature. The result is for showing who is signed in and must never be
//! used to make an authorization decision.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

/// Unverified name/email claims from an id token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DisplayClaims {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl DisplayClaims {
    /// Decode the JWT payload segment. Anything malformed yields empty claims.
    pub fn decode(id_token: &str) -> Self {
        let Some(payload) = id_token.split('.').nth(1) else {
            return Self::default();
        };
        URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    /// Best available label: name, then given name, then email.
    pub fn display_name(&self) -> Option<&str> {
        [&self.name, &self.given_name, &self.email]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .find(|v| !v.trim().is_empty())
    }

    /// Avatar initials: `?` when unknown, one letter for a single word,
    /// otherwise first letters of the first and last words.
    pub fn initials(&self) -> String {
        let Some(name) = self.display_name() else {
            return "?".to_string();
        };
        let words: Vec<&str> = name.split_whitespace().collect();
        let first_char = |w: &str| w.chars().next().map(|c| c.to_uppercase().collect::<String>());
        match words.as_slice() {
            [] => "?".to_string(),
            [only] => first_char(*only).unwrap_or_else(|| "?".into()),
            [first, .., last] => format!(
                "{}{}",
                first_char(*first).unwrap_or_default(),
                first_char(*last).unwrap_or_default()
            ),
        }
    }
}
