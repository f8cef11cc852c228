//! Environment configuration for different deployment stages

use std::env;
use std::time::Duration;

use tracing::Level;

use crate::{credentials::schedule::DEFAULT_SAFETY_MARGIN_SECS, storage::StorageTarget};

const DEFAULT_BUCKET: &str = "growth-public";
const DEFAULT_REGION: &str = "oss-cn-shanghai";
const DEFAULT_TOKEN_TIMEOUT_SECS: u64 = 10;

/// Application environment configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    /// Production environment
    Production,
    /// Staging environment
    Staging,
    /// Development environment (uses `LocalStack` and a local console backend)
    Development {
        /// Optional override for the refresh safety margin in seconds
        refresh_margin_override: Option<u32>,
    },
}

impl Environment {
    /// Creates an Environment from the `APP_ENV` environment variable
    ///
    /// # Panics
    ///
    /// Panics if `APP_ENV` contains an invalid value
    #[must_use]
    pub fn from_env() -> Self {
        let env = env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .trim()
            .to_lowercase();

        match env.as_str() {
            "production" => Self::Production,
            "staging" => Self::Staging,
            "development" => {
                let refresh_margin_override = env::var("REFRESH_SAFETY_MARGIN_SECS")
                    .ok()
                    .and_then(|val| val.parse::<u32>().ok());

                Self::Development {
                    refresh_margin_override,
                }
            }
            _ => panic!("Invalid environment: {env}"),
        }
    }

    /// URL of the console backend's STS token route
    ///
    /// # Panics
    ///
    /// Panics if `STS_TOKEN_ENDPOINT` is not set outside development
    #[must_use]
    pub fn token_endpoint_url(&self) -> String {
        match self {
            Self::Production | Self::Staging => env::var("STS_TOKEN_ENDPOINT")
                .expect("STS_TOKEN_ENDPOINT environment variable is not set"),
            Self::Development { .. } => env::var("STS_TOKEN_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:8080/api/oss/sts-token".to_string()),
        }
    }

    /// Token saved by the console login screen, forwarded to the token route
    #[must_use]
    pub fn console_auth_token(&self) -> Option<String> {
        env::var("CONSOLE_AUTH_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty())
    }

    /// Timeout of one token request
    #[must_use]
    pub fn token_request_timeout(&self) -> Duration {
        let secs = env::var("TOKEN_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TOKEN_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    /// Buffer before expiry at which credentials are refreshed
    #[must_use]
    pub fn refresh_safety_margin_secs(&self) -> u32 {
        match self {
            Self::Production | Self::Staging => DEFAULT_SAFETY_MARGIN_SECS,
            Self::Development {
                refresh_margin_override,
            } => refresh_margin_override.unwrap_or(DEFAULT_SAFETY_MARGIN_SECS),
        }
    }

    /// Returns the endpoint URL to use for the storage service
    #[must_use]
    pub fn override_storage_endpoint_url(&self) -> Option<String> {
        if let Ok(url) = env::var("STORAGE_ENDPOINT_URL") {
            return Some(url);
        }
        match self {
            Self::Production | Self::Staging => None,
            // LocalStack endpoint for development
            Self::Development { .. } => Some("http://localhost:4566".to_string()),
        }
    }

    /// Bucket that receives cover images
    #[must_use]
    pub fn storage_target(&self) -> StorageTarget {
        let bucket = env::var("STORAGE_BUCKET").unwrap_or_else(|_| DEFAULT_BUCKET.to_string());
        let region = env::var("STORAGE_REGION").unwrap_or_else(|_| DEFAULT_REGION.to_string());
        let endpoint_url = self.override_storage_endpoint_url();

        // Path style for LocalStack; OSS only serves virtual-hosted buckets
        let force_path_style = matches!(self, Self::Development { .. });

        let public_base_url = env::var("STORAGE_PUBLIC_BASE_URL").unwrap_or_else(|_| {
            match (&endpoint_url, force_path_style) {
                (Some(endpoint), true) => {
                    format!("{}/{bucket}", endpoint.trim_end_matches('/'))
                }
                _ => format!("https://{bucket}.{region}.aliyuncs.com"),
            }
        });

        StorageTarget {
            bucket,
            region,
            endpoint_url,
            force_path_style,
            public_base_url,
        }
    }

    /// Whether logs are emitted as JSON
    #[must_use]
    pub const fn json_logs(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }

    #[must_use]
    pub fn tracing_level(&self) -> Level {
        env::var("TRACING_LEVEL")
            .ok()
            .and_then(|val| val.parse::<Level>().ok())
            .unwrap_or(match self {
                Self::Production | Self::Staging => Level::INFO,
                Self::Development { .. } => Level::DEBUG,
            })
    }
}
