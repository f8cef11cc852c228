//! Error types for credential acquisition

use thiserror::Error;

/// Result type for token endpoint operations
pub type FetchResult<T> = Result<T, CredentialFetchError>;

/// Errors that can occur while obtaining a temporary credential
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialFetchError {
    /// The token endpoint could not be reached
    #[error("token endpoint unreachable: {0}")]
    Unreachable(String),

    /// The token endpoint answered with a non-success status
    #[error("token endpoint rejected the request with status {status}")]
    Rejected {
        /// HTTP status returned by the endpoint
        status: u16,
    },

    /// The response body could not be decoded
    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    /// The `expiration` field is not an RFC 3339 timestamp
    #[error("invalid credential expiration: {0}")]
    InvalidExpiration(String),

    /// The HTTP client could not be configured
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl From<reqwest::Error> for CredentialFetchError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::Rejected {
                status: status.as_u16(),
            };
        }
        if error.is_decode() {
            return Self::InvalidResponse(error.to_string());
        }
        Self::Unreachable(error.to_string())
    }
}
