//! Forced-logout signalling.

use tokio::sync::broadcast;

use crate::error::RefreshError;

/// Emitted once per failed refresh cycle, after the store was cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionExpired {
    /// Where the user has to go to sign in again (`/login` by default).
    pub login_path: String,
    pub reason: RefreshError,
}

/// Receiver of forced-logout events.
///
/// Called synchronously from the refresh task; implementations should hand
/// work off rather than block. Any `Fn(&SessionExpired)` closure is a handler.
pub trait SessionExpiredHandler: Send + Sync {
    fn on_session_expired(&self, event: &SessionExpired);
}

impl<F> SessionExpiredHandler for F
where
    F: Fn(&SessionExpired) + Send + Sync,
{
    fn on_session_expired(&self, event: &SessionExpired) {
        self(event);
    }
}

/// Handler that only logs. Used when nothing else is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogExpiryHandler;

impl SessionExpiredHandler for LogExpiryHandler {
    fn on_session_expired(&self, event: &SessionExpired) {
        tracing::warn!(
            login_path = %event.login_path,
            reason = %event.reason,
            "session expired; sign in again"
        );
    }
}

/// Publishes events on a broadcast channel so several components can react
/// to a forced logout.
#[derive(Debug, Clone)]
pub struct BroadcastExpiryHandler {
    sender: broadcast::Sender<SessionExpired>,
}

impl BroadcastExpiryHandler {
    /// `capacity` bounds how many events a slow subscriber may lag behind.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionExpired> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastExpiryHandler {
    fn default() -> Self {
        Self::new(16)
    }
}

impl SessionExpiredHandler for BroadcastExpiryHandler {
    fn on_session_expired(&self, event: &SessionExpired) {
        if self.sender.send(event.clone()).is_err() {
            tracing::debug!("session expired with no subscribers");
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event() -> SessionExpired {
        SessionExpired {
            login_path: "/login".into(),
            reason: RefreshError::MissingRefreshToken,
        }
    }

    #[test]
    fn closures_are_handlers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler = move |e: &SessionExpired| {
            assert_eq!(e.login_path, "/login");
            counter.fetch_add(1, Ordering::SeqCst);
        };
        handler.on_session_expired(&event());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let handler = BroadcastExpiryHandler::default();
        let mut a = handler.subscribe();
        let mut b = handler.subscribe();

        handler.on_session_expired(&event());

        assert_eq!(a.recv().await.unwrap(), event());
        assert_eq!(b.recv().await.unwrap(), event());
    }

    #[test]
    fn broadcast_without_subscribers_does_not_panic() {
        BroadcastExpiryHandler::new(0).on_session_expired(&event());
        LogExpiryHandler.on_session_expired(&event());
    }
}
