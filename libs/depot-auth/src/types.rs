use std::collections::BTreeMap;

use depot_utils::SecretString;
use serde::{Deserialize, Serialize};

/// Access/refresh token pair issued by `/auth/login` and `/auth/refresh`.
///
/// Both values are opaque. `Debug` output is redacted.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
}

impl TokenPair {
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::new(access_token),
            refresh_token: SecretString::new(refresh_token),
        }
    }
}

/// The logged-in console user.
///
/// Fields the client does not model are kept in `extra` so that a profile
/// written to disk round-trips without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Wire form of a token pair (`{ accessToken, refreshToken }`).
///
/// Only lives for the duration of a deserialization; converted into a
/// [`TokenPair`] right away.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<WireTokenPair> for TokenPair {
    fn from(wire: WireTokenPair) -> Self {
        Self::new(wire.access_token, wire.refresh_token)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// `POST /auth/refresh` response envelope.
#[derive(Deserialize)]
pub(crate) struct RefreshResponse {
    #[serde(default)]
    pub success: bool,
    pub data: Option<WireTokenPair>,
    pub message: Option<String>,
}
