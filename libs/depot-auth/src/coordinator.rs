//! Single-flight token refresh.
//!
//! At most one refresh exchange runs per coordinator. The first request to
//! see a 401 installs a shared future for the cycle; every other request that
//! fails while it runs awaits that same future instead of starting another
//! exchange. The shared future is the queue: when it settles, every awaiter
//! wakes with the same new access token or the same error.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use depot_utils::SecretString;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::config::SessionConfig;
use crate::error::RefreshError;
use crate::exchange::RefreshExchange;
use crate::expiry::{SessionExpired, SessionExpiredHandler};
use crate::store::TokenStore;

type SharedRefresh = Shared<BoxFuture<'static, Result<SecretString, RefreshError>>>;

struct InFlight {
    cycle: u64,
    refresh: SharedRefresh,
}

/// What a request that got a 401 should do next.
#[derive(Debug)]
pub enum Recovery {
    /// Replay once with this access token.
    Replay(SecretString),
    /// The session was ended after the request went out. Hand the 401 back
    /// unchanged; the forced logout for that session already happened.
    SessionEnded,
}

/// Owns the refresh state of one authenticated client.
///
/// Cloned clients share one coordinator through an `Arc`; separate clients
/// (or separate tests) never share refresh state.
pub struct RefreshCoordinator {
    store: Arc<dyn TokenStore>,
    exchange: Arc<dyn RefreshExchange>,
    on_expired: Arc<dyn SessionExpiredHandler>,
    login_path: String,
    refresh_timeout: Duration,
    in_flight: Mutex<Option<InFlight>>,
    cycles: AtomicU64,
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(
        config: &SessionConfig,
        store: Arc<dyn TokenStore>,
        exchange: Arc<dyn RefreshExchange>,
        on_expired: Arc<dyn SessionExpiredHandler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            exchange,
            on_expired,
            login_path: config.login_path.clone(),
            refresh_timeout: config.refresh_timeout,
            in_flight: Mutex::new(None),
            cycles: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// `true` while a refresh cycle is running.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    /// Number of refresh cycles started so far.
    #[must_use]
    pub fn cycles_started(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Decide how to recover from a 401 on a request that was sent with
    /// `sent` as its access token.
    ///
    /// - A running cycle is joined.
    /// - If the store already holds a different token (a cycle finished after
    ///   the request went out), that token is used without a new exchange.
    /// - If the request carried a token and the store is now empty, the
    ///   session has already been ended.
    /// - Otherwise a new cycle starts.
    ///
    /// # Errors
    /// Returns the cycle's [`RefreshError`] if the refresh failed. By then the
    /// store has been cleared and the session-expired handler has run.
    pub async fn recover(
        self: &Arc<Self>,
        sent: Option<&SecretString>,
    ) -> Result<Recovery, RefreshError> {
        let refresh = {
            let mut slot = self.in_flight.lock();
            if let Some(running) = slot.as_ref() {
                tracing::debug!(cycle = running.cycle, "joining in-flight token refresh");
                running.refresh.clone()
            } else {
                match (sent, self.store.access_token()) {
                    (Some(sent), Some(current)) if !sent.matches(&current) => {
                        tracing::debug!("access token changed since request was sent; replaying");
                        return Ok(Recovery::Replay(current));
                    }
                    (None, Some(current)) => return Ok(Recovery::Replay(current)),
                    (Some(_), None) => return Ok(Recovery::SessionEnded),
                    _ => self.start_cycle(&mut slot),
                }
            }
        };
        refresh.await.map(Recovery::Replay)
    }

    /// Run a refresh now, or join the one already running.
    ///
    /// # Errors
    /// Same as [`recover`](Self::recover).
    pub async fn refresh(self: &Arc<Self>) -> Result<SecretString, RefreshError> {
        let refresh = {
            let mut slot = self.in_flight.lock();
            match slot.as_ref() {
                Some(running) => running.refresh.clone(),
                None => self.start_cycle(&mut slot),
            }
        };
        refresh.await
    }

    /// Install a new cycle. Must be called with the slot lock held and the
    /// slot empty.
    fn start_cycle(self: &Arc<Self>, slot: &mut Option<InFlight>) -> SharedRefresh {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(cycle, "starting token refresh");

        // Spawned so that a cancelled caller does not strand the other waiters.
        let task = tokio::spawn(Arc::clone(self).run_cycle(cycle));
        let this = Arc::clone(self);
        let refresh = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    let err = RefreshError::Aborted(join_error.to_string());
                    this.end_session(cycle, &err);
                    this.finish(cycle);
                    Err(err)
                }
            }
        }
        .boxed()
        .shared();

        *slot = Some(InFlight {
            cycle,
            refresh: refresh.clone(),
        });
        refresh
    }

    async fn run_cycle(self: Arc<Self>, cycle: u64) -> Result<SecretString, RefreshError> {
        let outcome = self.exchange_and_store().await;
        match &outcome {
            Ok(_) => tracing::info!(cycle, "access token refreshed"),
            Err(err) => self.end_session(cycle, err),
        }
        self.finish(cycle);
        outcome
    }

    async fn exchange_and_store(&self) -> Result<SecretString, RefreshError> {
        let refresh_token = self
            .store
            .refresh_token()
            .filter(|t| !t.is_empty())
            .ok_or(RefreshError::MissingRefreshToken)?;

        let pair = tokio::time::timeout(
            self.refresh_timeout,
            self.exchange.exchange(&refresh_token),
        )
        .await
        .map_err(|_| RefreshError::TimedOut(self.refresh_timeout))??;

        // File-backed stores write and fsync here; keep that off the runtime.
        let store = Arc::clone(&self.store);
        let access_token = pair.access_token.clone();
        tokio::task::spawn_blocking(move || store.set_tokens(&pair))
            .await
            .map_err(|e| RefreshError::Store(e.to_string()))?
            .map_err(|e| RefreshError::Store(e.to_string()))?;
        Ok(access_token)
    }

    /// Clear the store and signal the login boundary. Runs once per failed
    /// cycle.
    fn end_session(&self, cycle: u64, reason: &RefreshError) {
        tracing::warn!(cycle, error = %reason, "token refresh failed; ending session");
        if let Err(e) = self.store.clear_all() {
            tracing::warn!(error = %e, "failed to clear token store");
        }
        self.on_expired.on_session_expired(&SessionExpired {
            login_path: self.login_path.clone(),
            reason: reason.clone(),
        });
    }

    fn finish(&self, cycle: u64) {
        let mut slot = self.in_flight.lock();
        if slot.as_ref().is_some_and(|running| running.cycle == cycle) {
            *slot = None;
        }
    }
}
