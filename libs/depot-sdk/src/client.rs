use std::sync::Arc;

use depot_auth::{
    HttpClientBuilderExt, HttpRefreshExchange, LogExpiryHandler, MemoryTokenStore,
    RefreshCoordinator, RefreshExchange, SessionConfig, SessionExpiredHandler, TokenPair,
    TokenStore, UserProfile, WireTokenPair,
};
use depot_http::{HttpClient, HttpClientBuilder, HttpClientConfig};
use depot_utils::SecretString;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use crate::envelope::read_envelope;
use crate::error::ApiError;
use crate::resource::{Resource, ResourceKind};

const LOGIN_PATH: &str = "/auth/login";
const LOGOUT_PATH: &str = "/auth/logout";
const PROFILE_PATH: &str = "/auth/me";

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogoutRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct LoginData {
    #[serde(flatten)]
    tokens: WireTokenPair,
    user: UserProfile,
}

/// Client for the depot console backend.
///
/// Requests made through [`http`](Self::http) or [`resource`](Self::resource)
/// carry the session's bearer token and recover from 401s with a shared,
/// single-flight refresh. Login and logout go through a separate client
/// without that layer, so a rejected password is never mistaken for an
/// expired session.
pub struct ConsoleClient {
    http: HttpClient,
    auth_http: HttpClient,
    session: SessionConfig,
    coordinator: Arc<RefreshCoordinator>,
}

impl ConsoleClient {
    #[must_use]
    pub fn builder(base_url: Url) -> ConsoleClientBuilder {
        ConsoleClientBuilder::new(base_url)
    }

    /// Client with the session layer installed.
    #[must_use]
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        self.coordinator.store()
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    #[must_use]
    pub fn session_config(&self) -> &SessionConfig {
        &self.session
    }

    /// Absolute URL for an API path such as `/vendors`.
    ///
    /// # Errors
    /// Returns [`ApiError::Config`] if the URL cannot be built.
    pub fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.session.endpoint(path)?)
    }

    #[must_use]
    pub fn resource(&self, kind: ResourceKind) -> Resource<'_> {
        Resource::new(self, kind)
    }

    /// `true` while an access token is stored. The token may still be
    /// expired; the next request finds out.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.store().access_token().is_some_and(|t| !t.is_empty())
    }

    #[must_use]
    pub fn current_user(&self) -> Option<UserProfile> {
        self.store().user()
    }

    /// Sign in and store the issued tokens and profile.
    ///
    /// # Errors
    /// Returns [`ApiError::Api`] with the backend's message for rejected
    /// credentials, [`ApiError::Store`] if the session cannot be persisted.
    #[instrument(skip_all, fields(email = %email))]
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<UserProfile, ApiError> {
        let url = self.endpoint(LOGIN_PATH)?;
        let response = self
            .auth_http
            .post(url.as_str())
            .json(&LoginRequest {
                email,
                password: password.expose(),
            })?
            .send()
            .await?;

        let data: LoginData = read_envelope(response).await?.into_data("POST /auth/login")?;
        let pair = TokenPair::from(data.tokens);
        let store = self.store();
        store.set_tokens(&pair)?;
        store.set_user(data.user.clone())?;

        tracing::info!(user_id = %data.user.id, "logged in");
        Ok(data.user)
    }

    /// End the session.
    ///
    /// The backend is told to revoke the refresh token on a best-effort basis;
    /// the local session is cleared whatever it answers.
    ///
    /// # Errors
    /// Returns [`ApiError::Store`] if the stored session cannot be removed.
    #[instrument(skip_all)]
    pub async fn logout(&self) -> Result<(), ApiError> {
        let store = self.store();
        if let Some(refresh_token) = store.refresh_token() {
            if let Err(e) = self.revoke(&refresh_token, store.access_token()).await {
                tracing::warn!(error = %e, "logout request failed; clearing local session anyway");
            }
        }
        store.clear_all()?;
        tracing::info!("logged out");
        Ok(())
    }

    async fn revoke(
        &self,
        refresh_token: &SecretString,
        access_token: Option<SecretString>,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(LOGOUT_PATH)?;
        let mut request = self.auth_http.post(url.as_str()).json(&LogoutRequest {
            refresh_token: refresh_token.expose(),
        })?;
        if let Some(token) = access_token {
            request = request.header("authorization", &format!("Bearer {}", token.expose()));
        }
        let response = request.send().await?;
        crate::envelope::read_ack(response).await
    }

    /// Load the profile from `GET /auth/me` and store it.
    ///
    /// # Errors
    /// Returns [`ApiError`] on failure; a session that cannot be refreshed
    /// shows up as [`ApiError::is_session_expired`].
    #[instrument(skip_all)]
    pub async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        let url = self.endpoint(PROFILE_PATH)?;
        let response = self.http.get(url.as_str()).send().await?;
        let user: UserProfile = read_envelope(response).await?.into_data("GET /auth/me")?;
        self.store().set_user(user.clone())?;
        Ok(user)
    }

    /// Send an arbitrary authenticated request and return the envelope's
    /// `data` (`null` when absent).
    ///
    /// # Errors
    /// Returns [`ApiError`] on transport failure, error status or
    /// `success: false`.
    #[instrument(skip_all, fields(method = %method, path = %path))]
    pub async fn send_json(
        &self,
        method: http::Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, ApiError> {
        let url = self.endpoint(path)?;
        let mut request = self.http.request(method, url.as_str());
        if let Some(body) = body {
            request = request.json(body)?;
        }
        let response = request.send().await?;
        let envelope = read_envelope::<serde_json::Value>(response).await?;
        Ok(envelope.data.unwrap_or(serde_json::Value::Null))
    }
}

/// Builder for [`ConsoleClient`].
#[must_use]
pub struct ConsoleClientBuilder {
    session: SessionConfig,
    http: HttpClientConfig,
    store: Option<Arc<dyn TokenStore>>,
    on_expired: Option<Arc<dyn SessionExpiredHandler>>,
    exchange: Option<Arc<dyn RefreshExchange>>,
}

impl ConsoleClientBuilder {
    pub fn new(base_url: Url) -> Self {
        Self {
            session: SessionConfig::new(base_url),
            http: HttpClientConfig::default(),
            store: None,
            on_expired: None,
            exchange: None,
        }
    }

    /// Replace the session settings. Its `base_url` wins over the one given
    /// to [`new`](Self::new).
    pub fn session_config(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn http_config(mut self, http: HttpClientConfig) -> Self {
        self.http = http;
        self
    }

    /// Defaults to an in-memory store.
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to [`LogExpiryHandler`].
    pub fn on_session_expired(mut self, handler: Arc<dyn SessionExpiredHandler>) -> Self {
        self.on_expired = Some(handler);
        self
    }

    /// Defaults to [`HttpRefreshExchange`] against the configured refresh path.
    pub fn refresh_exchange(mut self, exchange: Arc<dyn RefreshExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    /// # Errors
    /// Returns [`ApiError::Config`] for invalid session settings and
    /// [`ApiError::Http`] if a client cannot be built.
    pub fn build(self) -> Result<ConsoleClient, ApiError> {
        let Self {
            mut session,
            http,
            store,
            on_expired,
            exchange,
        } = self;
        session.validate()?;

        if session.http_config.is_none() {
            session.http_config = Some(HttpClientConfig {
                transport: http.transport,
                user_agent: http.user_agent.clone(),
                ..HttpClientConfig::refresh_endpoint()
            });
        }

        let exchange = match exchange {
            Some(exchange) => exchange,
            None => Arc::new(HttpRefreshExchange::new(&session)?),
        };
        let store = store.unwrap_or_else(|| Arc::new(MemoryTokenStore::new()));
        let on_expired = on_expired.unwrap_or_else(|| Arc::new(LogExpiryHandler));
        let coordinator = RefreshCoordinator::new(&session, store, exchange, on_expired);

        let client = HttpClientBuilder::with_config(http.clone())
            .with_session_auth(Arc::clone(&coordinator))
            .build()?;
        let auth_client = HttpClientBuilder::with_config(http).build()?;

        Ok(ConsoleClient {
            http: client,
            auth_http: auth_client,
            session,
            coordinator,
        })
    }
}
