//! Auth coordinator: one authentication signal from token, cache and fetch.
//!
//! DESIGN
//! ======
//! Token presence and the cached user are read synchronously on every
//! snapshot. A cached user always wins: it reports authenticated and not
//! loading even while a background fetch runs. Fetches are gated so they
//! only run with a token, without a usable cached user and with nothing
//! already in flight.
//!
//! ERROR HANDLING
//! ==============
//! Transient failures fall back to the cached profile. A 401/403 is the only
//! fatal outcome: the token is discarded and the session cleared, which the
//! redirect rule then turns into a trip to the sign-in page.
//!
//! LIFECYCLE
//! =========
//! A coordinator is built once at startup and injected where needed. Each
//! signed-in period gets its own session id and root cancel token; `logout`
//! cancels everything started under the old root and opens a fresh one.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{ApiError, HttpProfileClient, ProfileApi, User};
use crate::cancel::CancelToken;
use crate::config::AppConfig;
use crate::routing::{self, Redirect, Resolution, SIGN_IN_ROUTE};
use crate::session::store::{SessionState, SessionStore};
use crate::storage::{FileTokenStore, StorageError, TokenStore};

// =============================================================================
// CACHE POLICY
// =============================================================================

/// How long a cached user may go without revalidation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    /// `None` keeps a cached user until logout or a rejected token.
    pub max_stale: Option<Duration>,
}

impl CachePolicy {
    #[must_use]
    pub fn never_stale() -> Self {
        Self { max_stale: None }
    }

    #[must_use]
    pub fn max_stale(max_stale: Duration) -> Self {
        Self { max_stale: Some(max_stale) }
    }

    #[must_use]
    pub fn is_fresh(&self, fetched_at: Option<Instant>, now: Instant) -> bool {
        match (self.max_stale, fetched_at) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(max), Some(at)) => now.saturating_duration_since(at) <= max,
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// The auth signal consumed by guards and redirects.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    pub user: Option<User>,
    pub is_loading: bool,
    pub is_authenticated: bool,
    pub error: Option<ApiError>,
}

impl AuthSnapshot {
    #[must_use]
    pub fn signed_out() -> Self {
        Self { user: None, is_loading: false, is_authenticated: false, error: None }
    }

    /// Combine token presence with store state.
    ///
    /// Without a token nothing is reported, not even a stale user. With a
    /// token and no user the session is optimistically authenticated and
    /// loading until a fetch fails; a failure with nothing cached ends in
    /// "not authenticated" with the error surfaced.
    ///
    /// A session that has not settled yet (no user, no error) reports loading
    /// even when nothing is in flight, e.g. after a cancelled fetch. The next
    /// `ensure_session` picks it up again.
    #[must_use]
    pub fn derive(has_token: bool, state: &SessionState) -> Self {
        if !has_token {
            return Self::signed_out();
        }
        if let Some(user) = &state.user {
            return Self { user: Some(user.clone()), is_loading: false, is_authenticated: true, error: None };
        }
        let pending = state.loading || state.error.is_none();
        Self { user: None, is_loading: pending, is_authenticated: pending, error: state.error.clone() }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session token must not be empty")]
    EmptyToken,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

// =============================================================================
// COORDINATOR
// =============================================================================

struct Lifecycle {
    id: Uuid,
    root: CancelToken,
}

impl Lifecycle {
    fn start() -> Self {
        Self { id: Uuid::new_v4(), root: CancelToken::new() }
    }
}

pub struct AuthCoordinator {
    store: SessionStore,
    tokens: Arc<dyn TokenStore>,
    policy: CachePolicy,
    lifecycle: Mutex<Lifecycle>,
}

impl AuthCoordinator {
    #[must_use]
    pub fn new(api: Arc<dyn ProfileApi>, tokens: Arc<dyn TokenStore>, policy: CachePolicy) -> Self {
        let lifecycle = Lifecycle::start();
        info!(session_id = %lifecycle.id, max_stale_secs = ?policy.max_stale.map(|d| d.as_secs()), "session started");
        Self { store: SessionStore::new(api), tokens, policy, lifecycle: Mutex::new(lifecycle) }
    }

    /// Wire the HTTP profile client and file token storage from config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, SessionError> {
        let api = HttpProfileClient::from_config(config)?;
        let tokens = FileTokenStore::new(config.token_path.clone());
        Ok(Self::new(Arc::new(api), Arc::new(tokens), CachePolicy { max_stale: config.cache_max_stale }))
    }

    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner).id
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    #[must_use]
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Token scoped to the current session; cancelled on logout.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.root().child()
    }

    fn root(&self) -> CancelToken {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner).root.clone()
    }

    fn read_token(&self) -> Option<String> {
        match self.tokens.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "token storage unreadable; treating session as signed out");
                None
            }
        }
    }

    #[must_use]
    pub fn has_token(&self) -> bool {
        self.read_token().is_some()
    }

    /// Current auth signal. Never suspends.
    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        AuthSnapshot::derive(self.has_token(), &self.store.state())
    }

    /// Run the background fetch if the gate allows it, then report.
    pub async fn ensure_session(&self, cancel: &CancelToken) -> AuthSnapshot {
        let Some(token) = self.read_token() else {
            if self.store.cached_user().is_some() {
                info!(session_id = %self.session_id(), "cached user without token; clearing session");
                self.store.clear();
            }
            return self.snapshot();
        };

        let state = self.store.state();
        if state.loading {
            debug!("profile fetch already in flight");
            return self.snapshot();
        }
        if state.user.is_some() && self.policy.is_fresh(state.fetched_at, Instant::now()) {
            return self.snapshot();
        }

        self.refresh(&token, cancel).await;
        self.snapshot()
    }

    /// Fetch even when a fresh cached user exists.
    pub async fn revalidate(&self, cancel: &CancelToken) -> AuthSnapshot {
        match self.read_token() {
            Some(token) if !self.store.is_loading() => self.refresh(&token, cancel).await,
            Some(_) => debug!("profile fetch already in flight"),
            None => self.store.clear(),
        }
        self.snapshot()
    }

    /// Spawn [`AuthCoordinator::ensure_session`] on the runtime.
    pub fn spawn_refresh(self: &Arc<Self>, cancel: CancelToken) -> JoinHandle<AuthSnapshot> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.ensure_session(&cancel).await })
    }

    /// Store a token issued by the sign-in flow and load its profile.
    ///
    /// # Errors
    ///
    /// Returns an error for a blank token or when the token cannot be saved.
    pub async fn sign_in(&self, token: &str, cancel: &CancelToken) -> Result<AuthSnapshot, SessionError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SessionError::EmptyToken);
        }
        self.store.clear();
        self.tokens.save(token)?;
        info!(session_id = %self.session_id(), "session token stored");
        self.refresh(token, cancel).await;
        Ok(self.snapshot())
    }

    /// End the session: cancel its work, drop the user and the token.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted token cannot be removed. The
    /// in-memory session is cleared regardless.
    pub fn logout(&self) -> Result<Redirect, SessionError> {
        let previous = {
            let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *lifecycle, Lifecycle::start())
        };
        previous.root.cancel();
        self.store.clear();
        self.tokens.clear()?;
        info!(session_id = %previous.id, "signed out");
        Ok(Redirect::to(SIGN_IN_ROUTE))
    }

    /// Redirect demanded by the current state at `path`, if any.
    #[must_use]
    pub fn redirect_for(&self, path: &str) -> Option<Redirect> {
        let redirect = routing::redirect_rule(path, &self.snapshot());
        if let Some(r) = &redirect {
            debug!(from = %path, to = %r.to, "redirect");
        }
        redirect
    }

    /// Redirect to the signed-in user's own dashboard.
    #[must_use]
    pub fn redirect_to_dashboard(&self) -> Option<Redirect> {
        self.snapshot().user.map(|user| Redirect::to(user.role.dashboard_route()))
    }

    #[must_use]
    pub fn resolve(&self, path: &str) -> Resolution {
        routing::resolve(path, &self.snapshot())
    }

    async fn refresh(&self, token: &str, cancel: &CancelToken) {
        let root = self.root();
        let result = tokio::select! {
            biased;
            () = root.cancelled() => Err(ApiError::Cancelled),
            result = self.store.fetch_user(token, cancel) => result,
        };

        match result {
            Ok(_) | Err(ApiError::Cancelled) => {}
            Err(e) if e.is_auth_rejection() => {
                warn!(session_id = %self.session_id(), error = %e, "session token rejected; signing out");
                self.end_session();
            }
            Err(e) if self.store.cached_user().is_some() => {
                debug!(error = %e, "keeping cached profile after fetch failure");
            }
            Err(e) => {
                debug!(error = %e, "no cached profile to fall back to");
            }
        }
    }

    fn end_session(&self) {
        self.store.clear();
        if let Err(e) = self.tokens.clear() {
            warn!(error = %e, "failed to remove rejected session token");
        }
    }
}

#[cfg(test)]
#[path = "coordinator_test.rs"]
mod tests;
