use thiserror::Error;

/// Classification of URL validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed
    ParseError,
    /// URL has no host/authority component
    MissingAuthority,
    /// URL has no scheme
    MissingScheme,
}

/// HTTP client error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Single request attempt timed out
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// HTTP non-2xx status
    #[error("HTTP {status}: {body_preview}")]
    HttpStatus {
        status: http::StatusCode,
        body_preview: String,
        content_type: Option<String>,
    },

    /// JSON parsing error
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Request buffer is full (fail-fast)
    #[error("Service overloaded: request buffer full")]
    Overloaded,

    /// Internal service failure (buffer worker died, channel closed)
    #[error("Service unavailable: internal failure")]
    ServiceClosed,

    /// The session could not be recovered after a 401.
    ///
    /// The source is the refresh failure that ended the session. Every
    /// request that was waiting on that refresh receives this variant.
    #[error("Session expired: {0}")]
    SessionExpired(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Invalid URL
    ///
    /// Match on `kind`; `reason` is a diagnostic for logs only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        url: String,
        kind: InvalidUriKind,
        reason: String,
    },

    /// URL scheme rejected by the transport security mode
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme { scheme: String, reason: String },
}

impl HttpError {
    /// `true` for [`HttpError::SessionExpired`].
    #[must_use]
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired(_))
    }

    /// Status code of an [`HttpError::HttpStatus`] error.
    #[must_use]
    pub fn status(&self) -> Option<http::StatusCode> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;
    use std::fmt;

    #[derive(Debug)]
    struct RefreshRejected;

    impl fmt::Display for RefreshRejected {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("refresh rejected: HTTP 401")
        }
    }

    impl Error for RefreshRejected {}

    #[test]
    fn session_expired_preserves_source() {
        let err = HttpError::SessionExpired(Box::new(RefreshRejected));
        assert!(err.is_session_expired());
        assert_eq!(err.to_string(), "Session expired: refresh rejected: HTTP 401");

        let source = err.source().unwrap();
        assert!(source.downcast_ref::<RefreshRejected>().is_some());
    }

    #[test]
    fn status_accessor_only_for_http_status() {
        let err = HttpError::HttpStatus {
            status: http::StatusCode::UNAUTHORIZED,
            body_preview: String::new(),
            content_type: None,
        };
        assert_eq!(err.status(), Some(http::StatusCode::UNAUTHORIZED));
        assert_eq!(HttpError::Overloaded.status(), None);
        assert!(!HttpError::Overloaded.is_session_expired());
    }

    #[test]
    fn transport_error_chain_has_two_links() {
        let err = HttpError::Transport(Box::new(RefreshRejected));
        let mut count = 0;
        let mut current: Option<&(dyn Error + 'static)> = Some(&err);
        while let Some(e) = current {
            count += 1;
            current = e.source();
        }
        assert_eq!(count, 2);
    }
}
