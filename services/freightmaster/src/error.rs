//! Service-specific error types

use thiserror::Error;

/// CLI usage and login-listener errors.
///
/// Auth and API failures keep their library types and reach `main` through
/// `anyhow`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown command: {0} (try --help)")]
    UnknownCommand(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("--agent, --vehicle and --destination only apply to shipment-manifests, not {0}")]
    FiltersNotSupported(String),

    #[error("redirect URI must point at this machine (localhost or a loopback address), got: {0}")]
    NonLoopbackRedirect(String),

    #[error("timed out after {0}s waiting for the browser to complete login")]
    LoginTimedOut(u64),

    #[error("login cancelled")]
    LoginCancelled,
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages_are_descriptive() {
        assert_eq!(
            Error::UnknownCommand("frobnicate".into()).to_string(),
            "unknown command: frobnicate (try --help)"
        );
        assert_eq!(
            Error::MissingArgument("<path>").to_string(),
            "missing argument: <path>"
        );
        assert!(Error::LoginTimedOut(300).to_string().contains("300s"));
        assert!(
            Error::NonLoopbackRedirect("https://app.example.com/cb".into())
                .to_string()
                .contains("https://app.example.com/cb")
        );
    }
}
