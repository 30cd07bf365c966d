use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

fn default_refresh_path() -> String {
    "/auth/refresh".to_owned()
}

fn default_login_path() -> String {
    "/login".to_owned()
}

fn default_refresh_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Session settings for one console backend.
///
/// `refresh_path` is resolved against `base_url`, so with
/// `https://console.example.com/api/` the exchange goes to
/// `https://console.example.com/api/auth/refresh`. `login_path` is not
/// requested by the client; it is handed to the session-expired handler as
/// the place to send the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub base_url: Url,

    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,

    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Upper bound on one refresh exchange. Expiry ends the session.
    #[serde(
        default = "default_refresh_timeout",
        with = "depot_utils::humantime_serde"
    )]
    pub refresh_timeout: Duration,

    /// Settings for the refresh client. `None` means
    /// [`HttpClientConfig::refresh_endpoint`](depot_http::HttpClientConfig::refresh_endpoint).
    #[serde(skip)]
    pub http_config: Option<depot_http::HttpClientConfig>,
}

impl SessionConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            refresh_path: default_refresh_path(),
            login_path: default_login_path(),
            refresh_timeout: default_refresh_timeout(),
            http_config: None,
        }
    }

    /// # Errors
    /// Returns [`ConfigError::Invalid`] if `base_url` cannot carry paths, the
    /// refresh path is empty, or the refresh timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!(
                "base_url '{}' cannot be used as a base URL",
                self.base_url
            )));
        }
        if self.refresh_path.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "refresh_path must not be empty".into(),
            ));
        }
        if self.refresh_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "refresh_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Absolute URL for an API path such as `/vendors` or `auth/refresh`.
    ///
    /// The path is appended to the base URL's path rather than replacing it.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if the joined URL does not parse.
    pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
        join_api_path(&self.base_url, path)
    }

    /// # Errors
    /// See [`endpoint`](Self::endpoint).
    pub fn refresh_url(&self) -> Result<Url, ConfigError> {
        self.endpoint(&self.refresh_path)
    }
}

/// Append `path` to `base`'s path, keeping whatever prefix `base` carries.
///
/// A `?query` or `#fragment` in `path` becomes the URL's query or fragment,
/// replacing any the base had.
///
/// # Errors
/// Returns [`ConfigError::Invalid`] if the result does not parse.
pub fn join_api_path(base: &Url, path: &str) -> Result<Url, ConfigError> {
    let (path, fragment) = match path.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (path, None),
    };
    let (path, query) = match path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path, None),
    };

    let mut joined = base.clone();
    let prefix = base.path().trim_end_matches('/');
    let suffix = path.trim_start_matches('/');
    joined.set_path(&format!("{prefix}/{suffix}"));
    joined.set_query(query);
    joined.set_fragment(fragment);
    if joined.cannot_be_a_base() {
        return Err(ConfigError::Invalid(format!(
            "cannot join '{path}' onto '{base}'"
        )));
    }
    Ok(joined)
}
