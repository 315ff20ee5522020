//! Resource loader with typed failure and bounded retry.
//!
//! DESIGN
//! ======
//! A loader owns a resource name and a [`RetryPolicy`]. Each `load` call runs
//! the supplied operation up to `max_attempts` times, sleeping an
//! exponentially growing, jittered delay between attempts. Cancellation is
//! checked before every attempt and raced against both the operation and
//! the backoff sleep. The final failure is wrapped with the resource name so
//! the message identifies what failed to load.

pub mod boundary;

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;

pub use boundary::{BoundaryError, ErrorBoundary, FeatureState};

// =============================================================================
// RETRY POLICY
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(200), max_delay: Duration::from_secs(5) }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Un-jittered delay after failed attempt `attempt` (1-based), capped.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.checked_mul(1u32 << shift).unwrap_or(self.max_delay);
        delay.min(self.max_delay)
    }

    /// Jittered delay in `[backoff / 2, backoff]`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        if delay_ms < 2 {
            return delay;
        }
        let half = delay_ms / 2;
        Duration::from_millis(half + rand::rng().random_range(0..=delay_ms - half))
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LoadError<E> {
    #[error("failed to load {resource} after {attempts} attempt(s): {source}")]
    Exhausted {
        resource: String,
        attempts: u32,
        #[source]
        source: E,
    },
    #[error("loading {resource} was cancelled")]
    Cancelled { resource: String },
}

impl<E> LoadError<E> {
    #[must_use]
    pub fn resource(&self) -> &str {
        match self {
            Self::Exhausted { resource, .. } | Self::Cancelled { resource } => resource,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

// =============================================================================
// LOADER
// =============================================================================

#[derive(Debug, Clone)]
pub struct ResourceLoader {
    resource: String,
    policy: RetryPolicy,
}

impl ResourceLoader {
    #[must_use]
    pub fn new(resource: impl Into<String>, policy: RetryPolicy) -> Self {
        Self { resource: resource.into(), policy }
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `op` until it succeeds, retrying every failure.
    ///
    /// `op` receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// `Exhausted` with the last failure once attempts run out, or
    /// `Cancelled` if `cancel` fires first.
    pub async fn load<T, E, F, Fut>(&self, cancel: &CancelToken, op: F) -> Result<T, LoadError<E>>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.load_when(cancel, |_| true, op).await
    }

    /// Like [`ResourceLoader::load`], but stops at the first failure that
    /// `retryable` rejects.
    ///
    /// # Errors
    ///
    /// See [`ResourceLoader::load`].
    pub async fn load_when<T, E, F, Fut, R>(
        &self,
        cancel: &CancelToken,
        retryable: R,
        mut op: F,
    ) -> Result<T, LoadError<E>>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
    {
        let max_attempts = self.policy.attempts();
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled());
            }

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(self.cancelled()),
                outcome = op(attempt) => outcome,
            };

            let err = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        info!(resource = %self.resource, attempt, "resource loaded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if attempt >= max_attempts || !retryable(&err) {
                warn!(resource = %self.resource, attempt, error = %err, "resource load failed");
                return Err(LoadError::Exhausted { resource: self.resource.clone(), attempts: attempt, source: err });
            }

            let delay = self.policy.delay_for(attempt);
            debug!(resource = %self.resource, attempt, delay_ms = delay.as_millis(), error = %err, "retrying resource load");
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(self.cancelled()),
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    fn cancelled<E>(&self) -> LoadError<E> {
        debug!(resource = %self.resource, "resource load cancelled");
        LoadError::Cancelled { resource: self.resource.clone() }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
