use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use depot_auth::SessionConfig;
use depot_http::{DEFAULT_USER_AGENT, HttpClientConfig, TransportSecurity};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use url::Url;

/// Prefix of environment overrides, e.g. `DEPOT__API__BASE_URL`.
pub const ENV_PREFIX: &str = "DEPOT__";

pub const DEFAULT_BASE_URL: &str = "https://localhost:5000/api";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub api: ApiSection,
    pub session: SessionSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub base_url: String,
    #[serde(with = "depot_utils::humantime_serde")]
    pub request_timeout: Duration,
    pub user_agent: String,
    /// Plain `http://` backends are refused unless this is set.
    pub allow_insecure_http: bool,
    /// Idle pooled connections are closed after this long; `null` keeps
    /// them until the server drops them.
    #[serde(with = "depot_utils::humantime_serde::option")]
    pub pool_idle_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub refresh_path: String,
    pub login_path: String,
    #[serde(with = "depot_utils::humantime_serde")]
    pub refresh_timeout: Duration,
    /// Where tokens are kept between runs. Defaults to
    /// `<config dir>/depot-console/session.json`.
    pub token_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            allow_insecure_http: false,
            pool_idle_timeout: HttpClientConfig::default().pool_idle_timeout,
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            refresh_path: "/auth/refresh".to_owned(),
            login_path: "/login".to_owned(),
            refresh_timeout: Duration::from_secs(30),
            token_file: None,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "warn".to_owned(),
            json: false,
        }
    }
}

impl CliConfig {
    /// Layered load: defaults, then the YAML file (if any), then `DEPOT__*`
    /// environment variables.
    ///
    /// # Errors
    /// Returns an error if the file is missing or any layer does not fit the
    /// schema.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            if !path.is_file() {
                anyhow::bail!("config file does not exist: {}", path.display());
            }
            figment = figment.merge(Yaml::file(path));
        }
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    fn extract(figment: Figment) -> Result<Self> {
        figment
            .extract()
            .context("invalid configuration")
    }

    pub fn apply_cli_overrides(&mut self, base_url: Option<&str>) {
        if let Some(url) = base_url {
            url.clone_into(&mut self.api.base_url);
        }
    }

    /// # Errors
    /// Returns an error if `api.base_url` is not an absolute URL.
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.api.base_url)
            .with_context(|| format!("invalid api.base_url '{}'", self.api.base_url))
    }

    #[must_use]
    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            request_timeout: self.api.request_timeout,
            user_agent: self.api.user_agent.clone(),
            pool_idle_timeout: self.api.pool_idle_timeout,
            transport: if self.api.allow_insecure_http {
                TransportSecurity::AllowInsecureHttp
            } else {
                TransportSecurity::TlsOnly
            },
            ..HttpClientConfig::default()
        }
    }

    /// # Errors
    /// Returns an error if the base URL or session settings are invalid.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let mut session = SessionConfig::new(self.base_url()?);
        session.refresh_path.clone_from(&self.session.refresh_path);
        session.login_path.clone_from(&self.session.login_path);
        session.refresh_timeout = self.session.refresh_timeout;
        session.validate()?;
        Ok(session)
    }

    /// # Errors
    /// Returns an error if no token file is configured and the platform has
    /// no config directory.
    pub fn token_file(&self) -> Result<PathBuf> {
        if let Some(path) = &self.session.token_file {
            return Ok(path.clone());
        }
        dirs::config_dir()
            .map(|dir| dir.join("depot-console").join("session.json"))
            .context("no config directory on this platform; set session.token_file")
    }
}
