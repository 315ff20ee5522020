//! Session store: the cached user record plus loading/error flags.
//!
//! DESIGN
//! ======
//! State lives in a `watch` channel so any number of observers can follow
//! it while the store stays the only writer. A fetch never invalidates the
//! cached user on failure (stale-while-revalidate) and never retries.
//!
//! RACES
//! =====
//! `clear` bumps an epoch. A fetch that started before the clear drops its
//! result instead of resurrecting a logged-out user. Dropping a fetch future
//! (cancellation, consumer gone) releases its in-flight slot through a guard.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{ApiError, ProfileApi, User};
use crate::cancel::CancelToken;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub user: Option<User>,
    /// True while at least one fetch is in flight.
    pub loading: bool,
    /// Last fetch failure; cleared by the next success.
    pub error: Option<ApiError>,
    /// When `user` was last confirmed by the API.
    pub fetched_at: Option<Instant>,
}

pub struct SessionStore {
    api: Arc<dyn ProfileApi>,
    state: watch::Sender<SessionState>,
    epoch: AtomicU64,
    in_flight: AtomicUsize,
}

impl SessionStore {
    #[must_use]
    pub fn new(api: Arc<dyn ProfileApi>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self { api, state, epoch: AtomicU64::new(0), in_flight: AtomicUsize::new(0) }
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn cached_user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Follow state changes. Rapid updates coalesce; observers always see the latest.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Issue one profile request and record the outcome.
    ///
    /// On success the user is replaced and the error cleared. On failure the
    /// error is recorded and any cached user is kept. Cancellation, or a
    /// `clear` while the request was in flight, leaves user and error alone
    /// and yields [`ApiError::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns the API error, or `Cancelled` as described above.
    pub async fn fetch_user(&self, token: &str, cancel: &CancelToken) -> Result<User, ApiError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let _slot = InFlight::enter(self);
        debug!("profile fetch started");

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ApiError::Cancelled),
            result = self.api.fetch_profile(token) => result,
        };

        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("session cleared during fetch; result discarded");
            return Err(ApiError::Cancelled);
        }

        match result {
            Ok(user) => {
                info!(user_id = %user.id, role = %user.role, "profile fetched");
                self.state.send_modify(|s| {
                    s.user = Some(user.clone());
                    s.error = None;
                    s.fetched_at = Some(Instant::now());
                });
                Ok(user)
            }
            Err(ApiError::Cancelled) => {
                debug!("profile fetch cancelled");
                Err(ApiError::Cancelled)
            }
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "profile fetch failed");
                let recorded = e.clone();
                self.state.send_modify(|s| s.error = Some(recorded));
                Err(e)
            }
        }
    }

    /// Forget the user and any error (logout or rejected token).
    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.state.send_modify(|s| {
            s.user = None;
            s.error = None;
            s.fetched_at = None;
        });
    }
}

struct InFlight<'a> {
    store: &'a SessionStore,
}

impl<'a> InFlight<'a> {
    fn enter(store: &'a SessionStore) -> Self {
        store.in_flight.fetch_add(1, Ordering::SeqCst);
        store.sync_loading();
        Self { store }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.store.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.store.sync_loading();
    }
}

impl SessionStore {
    /// Derive `loading` from the counter while holding the watch lock, so
    /// overlapping enter/drop pairs always settle on the current count.
    fn sync_loading(&self) {
        self.state.send_if_modified(|s| {
            let busy = self.in_flight.load(Ordering::SeqCst) > 0;
            std::mem::replace(&mut s.loading, busy) != busy
        });
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
