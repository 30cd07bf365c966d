use depot_auth::{ConfigError, StoreError};
use depot_http::HttpError;
use http::StatusCode;
use thiserror::Error;

use crate::resource::ResourceKind;

/// Errors from [`ConsoleClient`](crate::ConsoleClient) calls.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// Transport, timeout, body or session failure.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The backend answered with `success: false` or an error status carrying
    /// a `message`.
    #[error("{status}: {message}")]
    Api { status: StatusCode, message: String },

    /// A `success: true` envelope without the `data` the call expects.
    #[error("response from {0} has no data")]
    MissingData(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Mutation attempted on a read-only resource.
    #[error("{0} is read-only")]
    ReadOnly(ResourceKind),

    #[error("invalid API path '{0}'")]
    InvalidPath(String),
}

impl ApiError {
    /// `true` if the request failed because the session could not be
    /// refreshed. The caller has to log in again.
    #[must_use]
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_session_expired())
    }

    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status(),
            _ => None,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn api_error_renders_status_and_message() {
        let err = ApiError::Api {
            status: StatusCode::CONFLICT,
            message: "Vendor with this GST number already exists".into(),
        };
        assert_eq!(
            err.to_string(),
            "409 Conflict: Vendor with this GST number already exists"
        );
        assert_eq!(err.status(), Some(StatusCode::CONFLICT));
        assert!(!err.is_session_expired());
    }

    #[test]
    fn session_expiry_is_detected_through_http() {
        let err = ApiError::from(HttpError::SessionExpired(Box::new(
            depot_auth::RefreshError::MissingRefreshToken,
        )));
        assert!(err.is_session_expired());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn read_only_names_resource() {
        assert_eq!(
            ApiError::ReadOnly(ResourceKind::AuditLogs).to_string(),
            "audit-logs is read-only"
        );
    }
}
