use depot_http::HttpError;

/// One-line description of an [`HttpError`], prefixed with `context`.
///
/// Response bodies are left out: the refresh and login endpoints may echo
/// credentials back in error payloads.
#[must_use]
pub fn describe_http_error(e: &HttpError, context: &str) -> String {
    let detail = match e {
        HttpError::HttpStatus { status, .. } => format!("HTTP {status}"),
        HttpError::Json(err) => format!("JSON parse failed: {err}"),
        HttpError::Timeout(d) => format!("request timed out after {d:?}"),
        HttpError::Transport(err) => format!("transport error: {err}"),
        HttpError::Tls(err) => format!("TLS error: {err}"),
        HttpError::BodyTooLarge { limit, actual } => {
            format!("response too large: limit {limit} bytes, got {actual} bytes")
        }
        HttpError::InvalidUri { url, reason, .. } => format!("invalid URL '{url}': {reason}"),
        HttpError::InvalidScheme { scheme, reason } => {
            format!("invalid scheme '{scheme}': {reason}")
        }
        HttpError::Overloaded => "request rejected: client overloaded".to_owned(),
        HttpError::ServiceClosed => "client unavailable".to_owned(),
        HttpError::SessionExpired(_) => "session expired".to_owned(),
        _ => "request failed".to_owned(),
    };
    format!("{context} {detail}")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn status_excludes_body() {
        let err = HttpError::HttpStatus {
            status: http::StatusCode::UNAUTHORIZED,
            body_preview: r#"{"refreshToken":"R1"}"#.into(),
            content_type: None,
        };
        let msg = describe_http_error(&err, "session refresh");
        assert_eq!(msg, "session refresh HTTP 401 Unauthorized");
        assert!(!msg.contains("R1"));
    }

    #[test]
    fn timeout_and_overload() {
        assert_eq!(
            describe_http_error(&HttpError::Timeout(Duration::from_secs(15)), "login"),
            "login request timed out after 15s"
        );
        assert_eq!(
            describe_http_error(&HttpError::Overloaded, "login"),
            "login request rejected: client overloaded"
        );
    }

    #[test]
    fn context_prefixes_every_message() {
        for err in [
            HttpError::ServiceClosed,
            HttpError::Overloaded,
            HttpError::Timeout(Duration::from_millis(5)),
        ] {
            assert!(describe_http_error(&err, "CTX").starts_with("CTX "));
        }
    }
}
