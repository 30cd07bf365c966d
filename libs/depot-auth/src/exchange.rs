use async_trait::async_trait;
use depot_http::{HttpClient, HttpClientBuilder, HttpClientConfig, HttpError};
use depot_utils::SecretString;
use url::Url;

use crate::config::SessionConfig;
use crate::error::{ConfigError, RefreshError};
use crate::http_error::describe_http_error;
use crate::types::{RefreshRequest, RefreshResponse, TokenPair};

/// Trades a refresh token for a new token pair.
#[async_trait]
pub trait RefreshExchange: Send + Sync {
    /// # Errors
    /// Returns a [`RefreshError`] describing why no new pair was issued.
    async fn exchange(&self, refresh_token: &SecretString) -> Result<TokenPair, RefreshError>;
}

/// `POST {base_url}{refresh_path}` with `{ "refreshToken": "..." }`.
///
/// Uses its own [`HttpClient`] without the session layer, so a rejected
/// refresh never recurses into 401 recovery.
pub struct HttpRefreshExchange {
    client: HttpClient,
    url: Url,
}

const CONTEXT: &str = "session refresh";

impl HttpRefreshExchange {
    /// # Errors
    /// Returns [`ConfigError`] if the refresh URL is invalid or the client
    /// cannot be built.
    pub fn new(config: &SessionConfig) -> Result<Self, ConfigError> {
        let http_config = config
            .http_config
            .clone()
            .unwrap_or_else(HttpClientConfig::refresh_endpoint);
        let client = HttpClientBuilder::with_config(http_config)
            .build()
            .map_err(|e| ConfigError::Http(describe_http_error(&e, CONTEXT)))?;
        Ok(Self {
            client,
            url: config.refresh_url()?,
        })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl RefreshExchange for HttpRefreshExchange {
    async fn exchange(&self, refresh_token: &SecretString) -> Result<TokenPair, RefreshError> {
        let response = self
            .client
            .post(self.url.as_str())
            .json(&RefreshRequest {
                refresh_token: refresh_token.expose(),
            })
            .map_err(|e| RefreshError::Http(describe_http_error(&e, CONTEXT)))?
            .send()
            .await
            .map_err(|e| RefreshError::Http(describe_http_error(&e, CONTEXT)))?;

        let parsed: RefreshResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e @ HttpError::HttpStatus { .. }) => {
                return Err(RefreshError::Rejected(describe_http_error(&e, CONTEXT)));
            }
            Err(e @ HttpError::Json(_)) => {
                return Err(RefreshError::InvalidResponse(describe_http_error(
                    &e, CONTEXT,
                )));
            }
            Err(e) => return Err(RefreshError::Http(describe_http_error(&e, CONTEXT))),
        };

        match parsed {
            RefreshResponse {
                success: true,
                data: Some(pair),
                ..
            } => Ok(pair.into()),
            RefreshResponse {
                success: false,
                message,
                ..
            } => Err(RefreshError::InvalidResponse(
                message.unwrap_or_else(|| "success was false".to_owned()),
            )),
            RefreshResponse { data: None, .. } => Err(RefreshError::InvalidResponse(
                "missing token pair in data".to_owned(),
            )),
        }
    }
}
