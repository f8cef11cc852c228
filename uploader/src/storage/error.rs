//! Error types for object storage operations

use aws_sdk_s3::{error::ProvideErrorMetadata, error::SdkError, operation::put_object::PutObjectError};
use thiserror::Error;

/// Result type for object storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Error codes the storage service uses for a rejected identity
const AUTH_ERROR_CODES: &[&str] = &[
    "AccessDenied",
    "ExpiredToken",
    "InvalidAccessKeyId",
    "InvalidSecurityToken",
    "SecurityTokenExpired",
    "SignatureDoesNotMatch",
];

/// Errors that can occur during object storage operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The storage service rejected the credential
    #[error("credential rejected by storage: {0}")]
    Unauthorized(String),

    /// Any other service or transport failure
    #[error("storage service error: {0}")]
    ServiceError(String),
}

impl StoreError {
    /// Classifies a failed request from its HTTP status and service error code
    #[must_use]
    pub fn classify(status: Option<u16>, code: Option<&str>, message: String) -> Self {
        let auth_status = matches!(status, Some(401 | 403));
        let auth_code = code.is_some_and(|code| AUTH_ERROR_CODES.contains(&code));

        if auth_status || auth_code {
            Self::Unauthorized(message)
        } else {
            Self::ServiceError(message)
        }
    }
}

impl From<SdkError<PutObjectError>> for StoreError {
    fn from(error: SdkError<PutObjectError>) -> Self {
        match &error {
            SdkError::ServiceError(service_err) => {
                let status = service_err.raw().status().as_u16();
                let code = service_err.err().code();
                let message = service_err
                    .err()
                    .message()
                    .map_or_else(|| format!("{:?}", service_err.err()), ToString::to_string);
                Self::classify(Some(status), code, message)
            }
            _ => Self::ServiceError(error.to_string()),
        }
    }
}
