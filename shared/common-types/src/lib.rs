use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Temporary storage credential as issued by the console backend's STS token route
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StsTokenResponse {
    pub access_key_id: String,
    pub access_key_secret: String,
    pub security_token: String,
    /// RFC 3339 timestamp after which the credential is rejected by storage
    pub expiration: String,
}

/// Body of the token route.
///
/// The console backend wraps most responses in `{ "data": ... }`, but the
/// token route may also answer with the bare credential.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum StsTokenEnvelope {
    Wrapped { data: StsTokenResponse },
    Bare(StsTokenResponse),
}

impl StsTokenEnvelope {
    #[must_use]
    pub fn into_inner(self) -> StsTokenResponse {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}
