//! The `{ success, data, message, pagination }` wrapper every console
//! endpoint responds with.

use depot_http::{HttpError, HttpResponse};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    #[serde(alias = "pages")]
    pub total_pages: u32,
}

impl Pagination {
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` when the endpoint does not paginate.
    pub pagination: Option<Pagination>,
}

impl<T> Page<T> {
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.pagination.is_some_and(|p| p.has_next())
    }
}

impl<T> ApiEnvelope<T> {
    /// # Errors
    /// Returns [`ApiError::MissingData`] if `data` is absent.
    pub fn into_data(self, what: &str) -> Result<T, ApiError> {
        self.data.ok_or_else(|| ApiError::MissingData(what.to_owned()))
    }
}

/// Decode a response into its envelope.
///
/// Non-2xx statuses and `success: false` become [`ApiError::Api`] with the
/// backend's message; error bodies that are not an envelope become
/// [`HttpError::HttpStatus`].
pub(crate) async fn read_envelope<T: DeserializeOwned>(
    response: HttpResponse,
) -> Result<ApiEnvelope<T>, ApiError> {
    let status = response.status();
    if status.is_success() {
        let envelope: ApiEnvelope<T> = response.json().await?;
        if !envelope.success {
            return Err(ApiError::Api {
                status,
                message: envelope
                    .message
                    .unwrap_or_else(|| "request was not successful".to_owned()),
            });
        }
        return Ok(envelope);
    }
    Err(read_error(response).await)
}

/// Decode a response whose body the caller does not need. An empty 2xx body
/// counts as success.
pub(crate) async fn read_ack(response: HttpResponse) -> Result<(), ApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(read_error(response).await);
    }
    let body = response.bytes().await?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }
    let envelope: ApiEnvelope<serde_json::Value> =
        serde_json::from_slice(&body).map_err(HttpError::from)?;
    if envelope.success {
        Ok(())
    } else {
        Err(ApiError::Api {
            status,
            message: envelope
                .message
                .unwrap_or_else(|| "request was not successful".to_owned()),
        })
    }
}

async fn read_error(response: HttpResponse) -> ApiError {
    let status = response.status();
    let content_type = response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    match response
        .json_any_status::<ApiEnvelope<serde_json::Value>>()
        .await
    {
        Ok((_, ApiEnvelope {
            message: Some(message),
            ..
        })) => ApiError::Api { status, message },
        Ok(_) | Err(HttpError::Json(_)) => ApiError::Http(HttpError::HttpStatus {
            status,
            body_preview: String::new(),
            content_type,
        }),
        Err(e) => ApiError::Http(e),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_paginated_list() {
        let env: ApiEnvelope<Vec<serde_json::Value>> = serde_json::from_value(json!({
            "success": true,
            "data": [{"id": "v-1"}, {"id": "v-2"}],
            "pagination": {"page": 1, "limit": 2, "total": 5, "totalPages": 3}
        }))
        .unwrap();
        assert!(env.success);
        assert_eq!(env.data.as_ref().unwrap().len(), 2);
        let page = env.pagination.unwrap();
        assert_eq!(page.total, 5);
        assert!(page.has_next());
    }

    #[test]
    fn last_page_has_no_next() {
        let p = Pagination {
            page: 3,
            limit: 2,
            total: 5,
            total_pages: 3,
        };
        assert!(!p.has_next());
        let page = Page {
            items: vec![1],
            pagination: Some(p),
        };
        assert!(!page.has_next());
        assert!(!Page::<u8> { items: vec![], pagination: None }.has_next());
    }

    #[test]
    fn pages_alias_is_accepted() {
        let p: Pagination =
            serde_json::from_value(json!({"page": 2, "limit": 10, "total": 11, "pages": 2}))
                .unwrap();
        assert_eq!(p.total_pages, 2);
    }

    #[test]
    fn missing_data_is_reported() {
        let env: ApiEnvelope<serde_json::Value> =
            serde_json::from_value(json!({"success": true, "message": "ok"})).unwrap();
        let err = env.into_data("GET /auth/me").unwrap_err();
        assert_eq!(err.to_string(), "response from GET /auth/me has no data");
    }
}
