//! Short-lived storage credentials issued by the console backend
mod error;
pub mod schedule;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_types::{StsTokenEnvelope, StsTokenResponse};
use tracing::instrument;

pub use error::{CredentialFetchError, FetchResult};

/// A scoped, time-bounded storage identity
#[derive(Clone, PartialEq, Eq)]
pub struct TemporaryCredential {
    /// Access key id
    pub access_key_id: String,
    /// Access key secret
    pub access_key_secret: String,
    /// STS security token accompanying the key pair
    pub security_token: String,
    /// Instant after which the storage service rejects the credential
    pub expires_at: DateTime<Utc>,
}

impl TemporaryCredential {
    /// Whether the credential is past its expiry at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for TemporaryCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryCredential")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"** redacted **")
            .field("security_token", &"** redacted **")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl TryFrom<StsTokenResponse> for TemporaryCredential {
    type Error = CredentialFetchError;

    fn try_from(response: StsTokenResponse) -> FetchResult<Self> {
        let expires_at = DateTime::parse_from_rfc3339(response.expiration.trim())
            .map_err(|e| {
                CredentialFetchError::InvalidExpiration(format!("{}: {e}", response.expiration))
            })?
            .with_timezone(&Utc);

        Ok(Self {
            access_key_id: response.access_key_id,
            access_key_secret: response.access_key_secret,
            security_token: response.security_token,
            expires_at,
        })
    }
}

/// Source of temporary credentials
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    /// Obtains a fresh credential
    ///
    /// # Errors
    ///
    /// Returns `CredentialFetchError` when no credential could be obtained
    async fn fetch(&self) -> FetchResult<TemporaryCredential>;
}

/// Fetches credentials from the console backend's STS token route
pub struct HttpTokenFetcher {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpTokenFetcher {
    /// Creates a fetcher for `endpoint`
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Absolute URL of the token route
    /// * `auth_token` - Console login token, sent as a bearer token when present
    /// * `timeout` - Per-request timeout
    ///
    /// # Errors
    ///
    /// Returns `CredentialFetchError::ConfigError` if the HTTP client cannot be built
    pub fn new(
        endpoint: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CredentialFetchError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            auth_token,
        })
    }

    /// URL of the token route
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TokenFetcher for HttpTokenFetcher {
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn fetch(&self) -> FetchResult<TemporaryCredential> {
        let mut request = self.client.get(&self.endpoint);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Token endpoint answered {status}");
            return Err(CredentialFetchError::Rejected {
                status: status.as_u16(),
            });
        }

        let envelope: StsTokenEnvelope = response.json().await?;

        let credential = TemporaryCredential::try_from(envelope.into_inner())?;
        tracing::debug!(
            "Fetched credential {} expiring at {}",
            credential.access_key_id,
            credential.expires_at
        );

        Ok(credential)
    }
}
