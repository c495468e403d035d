//! Error taxonomy for the exporter.
//!
//! Mirrors the propagation policy from the design: a failure affecting one
//! (tenant, environment, region, destination, channel) must never cascade.
//! Only [`AuthError`] is allowed to reach a caller outside its own component
//! — every other error is caught at the narrowest enclosing loop, logged,
//! and converted into a counter increment.

use thiserror::Error;

/// Fatal, startup-time configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Errors from the token cache / authentication path.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication rejected by upstream: {0}")]
    Failed(String),
    #[error("transient error while authenticating: {0}")]
    Transient(String),
}

/// Errors from upstream API calls (C2).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication failed: {0}")]
    Auth(AuthError),
    #[error("transient upstream error: {0}")]
    Transient(String),
    #[error("resource not found upstream")]
    NotFound,
    #[error("failed to decode upstream response: {0}")]
    Decode(String),
}

/// `AuthError::Transient` must stay retryable once folded into `ApiError` —
/// only `AuthError::Failed` is a genuine (non-retryable) auth rejection.
impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Transient(msg) => ApiError::Transient(msg),
            failed @ AuthError::Failed(_) => ApiError::Auth(failed),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            ApiError::Transient(e.to_string())
        } else if let Some(status) = e.status() {
            if status.as_u16() == 404 {
                ApiError::NotFound
            } else if status.is_server_error() || status.as_u16() == 429 {
                ApiError::Transient(e.to_string())
            } else {
                ApiError::Decode(e.to_string())
            }
        } else {
            ApiError::Transient(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

/// Errors from a single notification channel delivery attempt.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel {channel} is not configured")]
    NotConfigured { channel: String },
    #[error("channel {channel} rejected payload: {reason}")]
    Rejected { channel: String, reason: String },
    #[error("channel {channel} transport error: {source}")]
    Transport {
        channel: String,
        #[source]
        source: reqwest::Error,
    },
}
