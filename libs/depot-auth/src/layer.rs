use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use depot_http::HttpError;
use depot_utils::SecretString;
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri, Version};
use http_body_util::Full;
use tower::{Layer, Service, ServiceExt};

use crate::coordinator::{Recovery, RefreshCoordinator};

/// Which send of a request this is.
///
/// Set in the request extensions by [`SessionAuthService`] so inner layers
/// can tell replays apart. A 401 on a `Replay` is never recovered again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Initial,
    Replay,
}

/// Tower layer that authenticates requests with the session's access token
/// and recovers from 401s through a shared [`RefreshCoordinator`].
#[derive(Clone)]
pub struct SessionAuthLayer {
    coordinator: Arc<RefreshCoordinator>,
}

impl SessionAuthLayer {
    #[must_use]
    pub fn new(coordinator: Arc<RefreshCoordinator>) -> Self {
        Self { coordinator }
    }
}

impl<S> Layer<S> for SessionAuthLayer {
    type Service = SessionAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionAuthService {
            inner,
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

/// Created by [`SessionAuthLayer`].
#[derive(Clone)]
pub struct SessionAuthService<S> {
    inner: S,
    coordinator: Arc<RefreshCoordinator>,
}

impl<S, ResBody> Service<Request<Full<Bytes>>> for SessionAuthService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Response<ResBody>, HttpError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        // Clone-swap pattern (Tower Service contract).
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let coordinator = Arc::clone(&self.coordinator);

        Box::pin(send_with_recovery(inner, coordinator, req))
    }
}

async fn send_with_recovery<S, ResBody>(
    mut inner: S,
    coordinator: Arc<RefreshCoordinator>,
    req: Request<Full<Bytes>>,
) -> Result<Response<ResBody>, HttpError>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResBody>, Error = HttpError>,
{
    let snapshot = RequestSnapshot::capture(&req);
    let sent = coordinator.store().access_token();

    let mut attempt = Attempt::Initial;
    let mut token = sent.clone();
    let mut req = req;

    loop {
        authorize(&mut req, token.as_ref());
        req.extensions_mut().insert(attempt);

        let response = inner.ready().await?.call(req).await?;
        if response.status() != StatusCode::UNAUTHORIZED || attempt == Attempt::Replay {
            if attempt == Attempt::Replay && response.status() == StatusCode::UNAUTHORIZED {
                tracing::warn!(uri = %snapshot.uri, "replayed request rejected with 401");
            }
            return Ok(response);
        }

        tracing::debug!(method = %snapshot.method, uri = %snapshot.uri, "401 received; recovering session");
        match coordinator.recover(sent.as_ref()).await {
            Ok(Recovery::Replay(fresh)) => {
                token = Some(fresh);
                attempt = Attempt::Replay;
                req = snapshot.rebuild();
            }
            Ok(Recovery::SessionEnded) => return Ok(response),
            Err(e) => return Err(HttpError::SessionExpired(Box::new(e))),
        }
    }
}

/// Set `Authorization: Bearer <token>`, replacing any existing value.
///
/// Without a token the request goes out as it is. A token that is not a legal
/// header value is skipped.
fn authorize<B>(req: &mut Request<B>, token: Option<&SecretString>) {
    let Some(token) = token else {
        return;
    };
    let raw = zeroize::Zeroizing::new(format!("Bearer {}", token.expose()));
    match HeaderValue::from_str(&raw) {
        Ok(mut value) => {
            value.set_sensitive(true);
            req.headers_mut().insert(AUTHORIZATION, value);
        }
        Err(_) => tracing::warn!("access token is not a valid header value; sending without it"),
    }
}

/// Everything needed to send a request again. Extensions are not carried.
struct RequestSnapshot {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Full<Bytes>,
}

impl RequestSnapshot {
    fn capture(req: &Request<Full<Bytes>>) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            version: req.version(),
            headers: req.headers().clone(),
            body: req.body().clone(),
        }
    }

    fn rebuild(&self) -> Request<Full<Bytes>> {
        let mut req = Request::new(self.body.clone());
        *req.method_mut() = self.method.clone();
        *req.uri_mut() = self.uri.clone();
        *req.version_mut() = self.version;
        *req.headers_mut() = self.headers.clone();
        req
    }
}
