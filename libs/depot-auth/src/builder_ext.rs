use std::sync::Arc;

use tower::ServiceExt;

use crate::coordinator::RefreshCoordinator;
use crate::layer::SessionAuthLayer;

/// Extension trait for adding session auth to [`depot_http::HttpClientBuilder`].
///
/// # Example
///
/// ```ignore
/// use depot_auth::{HttpClientBuilderExt, RefreshCoordinator};
///
/// let coordinator = RefreshCoordinator::new(&config, store, exchange, handler);
/// let client = HttpClientBuilder::new()
///     .with_session_auth(coordinator)
///     .build()?;
/// ```
pub trait HttpClientBuilderExt {
    /// Inject `Authorization: Bearer <token>` from the coordinator's store and
    /// recover from 401s through its single-flight refresh.
    ///
    /// Clients built with the same coordinator share one refresh cycle.
    #[must_use]
    fn with_session_auth(self, coordinator: Arc<RefreshCoordinator>) -> Self;
}

impl HttpClientBuilderExt for depot_http::HttpClientBuilder {
    fn with_session_auth(self, coordinator: Arc<RefreshCoordinator>) -> Self {
        let layer = SessionAuthLayer::new(coordinator);
        self.with_auth_layer(move |svc| {
            tower::ServiceBuilder::new()
                .layer(layer)
                .service(svc)
                .boxed_clone()
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::exchange::HttpRefreshExchange;
    use crate::expiry::LogExpiryHandler;
    use crate::store::{MemoryTokenStore, TokenStore};
    use crate::types::TokenPair;
    use depot_http::{HttpClientBuilder, HttpClientConfig};
    use httpmock::prelude::*;
    use url::Url;

    fn coordinator_for(server: &MockServer, store: Arc<MemoryTokenStore>) -> Arc<RefreshCoordinator> {
        let mut config = SessionConfig::new(Url::parse(&server.base_url()).unwrap());
        config.http_config = Some(HttpClientConfig::for_testing());
        let exchange = HttpRefreshExchange::new(&config).unwrap();
        RefreshCoordinator::new(&config, store, Arc::new(exchange), Arc::new(LogExpiryHandler))
    }

    #[tokio::test]
    async fn with_session_auth_injects_header() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/vendors")
                .header("authorization", "Bearer T1");
            then.status(200).json_body(serde_json::json!({"success": true, "data": []}));
        });

        let store = Arc::new(MemoryTokenStore::with_tokens(&TokenPair::new("T1", "R1")));
        let client = HttpClientBuilder::with_config(HttpClientConfig::for_testing())
            .with_session_auth(coordinator_for(&server, store))
            .build()
            .unwrap();

        client.get(&server.url("/vendors")).send().await.unwrap();
        api_mock.assert();
    }

    #[tokio::test]
    async fn without_token_no_header() {
        let server = MockServer::start();
        let auth_mock = server.mock(|when, then| {
            when.method(GET).path("/health").header_exists("authorization");
            then.status(200);
        });
        let fallback_mock = server.mock(|when, then| {
            when.method(GET).path("/health");
            then.status(200);
        });

        let store = Arc::new(MemoryTokenStore::new());
        assert!(store.access_token().is_none());
        let client = HttpClientBuilder::with_config(HttpClientConfig::for_testing())
            .with_session_auth(coordinator_for(&server, store))
            .build()
            .unwrap();

        client.get(&server.url("/health")).send().await.unwrap();
        assert_eq!(auth_mock.calls(), 0);
        fallback_mock.assert();
    }
}
