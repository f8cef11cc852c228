//! Error types for upload sessions

use thiserror::Error;

use crate::{credentials::CredentialFetchError, storage::StoreError};

/// Result type for uploads
pub type UploadResult<T> = Result<T, UploadFailure>;

/// A refresh that did not produce a usable credential
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    /// The token endpoint did not issue a new credential
    #[error("credential refresh failed: {0}")]
    Fetch(#[from] CredentialFetchError),

    /// The owning session ended while the refresh was in flight
    #[error("upload client was disposed")]
    Disposed,

    /// The client never acquired a credential
    #[error("upload client holds no credential")]
    NotAcquired,

    /// The refresh task stopped before settling
    #[error("credential refresh interrupted: {0}")]
    Interrupted(String),
}

/// Errors surfaced to the user when an upload cannot be performed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadFailure {
    /// A background refresh failed; the session must acquire a new client
    #[error("upload credentials are stale: {0}")]
    Stale(RefreshFailure),

    /// The credential expired and the refresh returned an already expired one
    #[error("upload credentials expired")]
    CredentialExpired,

    /// The client was used after its session ended
    #[error("upload client was disposed")]
    Disposed,

    /// The client has not acquired a credential yet
    #[error("upload client is not ready")]
    NotReady,

    /// The storage service rejected the credential
    #[error("storage rejected the upload credentials: {0}")]
    Unauthorized(String),

    /// Any other storage or network failure
    #[error("storage upload failed: {0}")]
    Storage(String),

    /// The cover image type is not accepted
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// Nothing to upload
    #[error("upload body is empty")]
    EmptyBody,
}

impl UploadFailure {
    /// Whether repeating the same user action may succeed
    #[must_use]
    pub const fn allow_retry(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::Storage(_))
    }

    /// Short message suitable for the upload form
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Stale(_) | Self::CredentialExpired => {
                "Upload credentials expired. Reopen the form to upload again."
            }
            Self::Disposed | Self::NotReady => "Uploads are not available for this form.",
            Self::Unauthorized(_) => "Storage rejected the upload. Please try again.",
            Self::Storage(_) => "The upload failed. Please try again.",
            Self::UnsupportedContentType(_) => {
                "Only JPEG, PNG, GIF and WebP cover images are supported."
            }
            Self::EmptyBody => "The selected file is empty.",
        }
    }
}

impl From<StoreError> for UploadFailure {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Unauthorized(msg) => Self::Unauthorized(msg),
            StoreError::ServiceError(msg) => Self::Storage(msg),
        }
    }
}
