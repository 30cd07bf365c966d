use std::time::Duration;

use thiserror::Error;

/// Why a refresh cycle failed.
///
/// Every request waiting on the same cycle receives a clone of this value,
/// wrapped in [`depot_http::HttpError::SessionExpired`]. Payloads are
/// pre-formatted strings that never contain token values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RefreshError {
    /// The store held no refresh token.
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// Transport failure talking to the refresh endpoint.
    #[error("{0}")]
    Http(String),

    /// The refresh endpoint answered with a non-2xx status.
    #[error("refresh rejected: {0}")]
    Rejected(String),

    /// 2xx response that is not `{ success: true, data: { accessToken, refreshToken } }`.
    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    /// The exchange did not finish within the configured refresh timeout.
    #[error("refresh timed out after {0:?}")]
    TimedOut(Duration),

    /// The new token pair could not be persisted.
    #[error("failed to store refreshed tokens: {0}")]
    Store(String),

    /// The refresh task ended without producing a result.
    #[error("refresh aborted: {0}")]
    Aborted(String),
}

/// Errors from persisted token stores.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("token store I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("token store file {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Invalid [`SessionConfig`](crate::SessionConfig).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("session config error: {0}")]
    Invalid(String),

    #[error("failed to build refresh client: {0}")]
    Http(String),
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn refresh_errors_render() {
        assert_eq!(
            RefreshError::MissingRefreshToken.to_string(),
            "no refresh token available"
        );
        assert_eq!(
            RefreshError::Rejected("session refresh HTTP 401 Unauthorized".into()).to_string(),
            "refresh rejected: session refresh HTTP 401 Unauthorized"
        );
        assert_eq!(
            RefreshError::TimedOut(Duration::from_secs(30)).to_string(),
            "refresh timed out after 30s"
        );
    }

    #[test]
    fn refresh_error_is_clone_and_comparable() {
        let e = RefreshError::InvalidResponse("success was false".into());
        assert_eq!(e.clone(), e);
    }

    #[test]
    fn store_error_keeps_path() {
        let e = StoreError::Io {
            path: "/tmp/session.json".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(e.to_string().contains("/tmp/session.json"));
    }
}
