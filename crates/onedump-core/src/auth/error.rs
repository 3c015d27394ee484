use reqwest::StatusCode;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by authentication and token management routines.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token endpoint error {status}: {body}")]
    TokenEndpoint { status: StatusCode, body: String },
    #[error("invalid token type '{0}'")]
    InvalidTokenType(String),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("no saved token")]
    TokenMissing,
    #[error("saved token was unreadable and has been deleted")]
    TokenCorrupt,
    #[error("timed out waiting for the authorization redirect")]
    RedirectTimeout,
    #[error("authorization listener terminated before receiving redirect")]
    ListenerClosed,
    #[error("authorization request denied ({0})")]
    AccessDenied(String),
    #[error("authorization response missing code parameter")]
    MissingAuthorizationCode,
    #[error("authorization state mismatch")]
    StateMismatch,
    #[error("failed to launch system browser: {0}")]
    BrowserLaunch(String),
    #[error("invalid redirect request: {0}")]
    InvalidRedirect(String),
}
