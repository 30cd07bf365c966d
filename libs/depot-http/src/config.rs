use std::time::Duration;

/// Default User-Agent string for console API requests
pub const DEFAULT_USER_AGENT: &str = concat!("depot-console/", env!("CARGO_PKG_VERSION"));

/// Transport security configuration
///
/// Controls whether the client enforces TLS or allows plain HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// HTTPS only (default)
    #[default]
    TlsOnly,
    /// Allow plain HTTP (local backends and mock servers only)
    AllowInsecureHttp,
}

/// Overall HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-request timeout (default: 30 seconds)
    ///
    /// A replay after a token refresh is a separate request and gets its own
    /// timeout.
    pub request_timeout: Duration,

    /// Maximum response body size in bytes (default: 10 MB)
    pub max_body_size: usize,

    /// User-Agent header value
    pub user_agent: String,

    /// Transport security mode (default: `TlsOnly`)
    pub transport: TransportSecurity,

    /// Capacity of the request buffer in front of the service stack
    /// (default: 1024). A full buffer fails fast with `Overloaded`.
    pub buffer_capacity: usize,

    /// Idle pooled connections are closed after this long (default: 90 s)
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum idle connections kept per host (default: 32)
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            transport: TransportSecurity::TlsOnly,
            buffer_capacity: 1024,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl HttpClientConfig {
    /// Small timeout and body limit.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024,
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(30)),
            pool_max_idle_per_host: 8,
            ..Self::default()
        }
    }

    /// Configuration for the `POST /auth/refresh` exchange client.
    ///
    /// Refresh responses are tiny and the exchange is issued at most once per
    /// refresh cycle, so the pool is kept small.
    #[must_use]
    pub fn refresh_endpoint() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            max_body_size: 64 * 1024,
            buffer_capacity: 16,
            pool_idle_timeout: Some(Duration::from_secs(60)),
            pool_max_idle_per_host: 2,
            ..Self::default()
        }
    }

    /// Configuration for tests against local mock servers (allows plain HTTP).
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024,
            transport: TransportSecurity::AllowInsecureHttp,
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
            ..Self::default()
        }
    }
}
