//! Feature-scoped failure isolation.
//!
//! Each feature (a dashboard section, a route subtree) has its own state.
//! Once a feature's load is exhausted the boundary trips: further runs are
//! refused without touching the loader until the feature is reset. Other
//! features keep loading normally.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tracing::{info, warn};

use super::{LoadError, ResourceLoader};
use crate::cancel::CancelToken;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeatureState {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed {
        message: String,
        attempts: u32,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum BoundaryError<E> {
    /// The feature failed earlier and has not been reset.
    #[error("{feature} is unavailable: {message}")]
    Tripped { feature: String, message: String },
    #[error(transparent)]
    Load(LoadError<E>),
}

#[derive(Debug, Default)]
pub struct ErrorBoundary {
    features: Mutex<HashMap<String, FeatureState>>,
}

impl ErrorBoundary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self, feature: &str) -> FeatureState {
        self.lock().get(feature).cloned().unwrap_or_default()
    }

    /// Features currently tripped, sorted by name.
    #[must_use]
    pub fn failed(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, state)| matches!(state, FeatureState::Failed { .. }))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Clear a feature so the next run loads again. Returns whether it had failed.
    pub fn reset(&self, feature: &str) -> bool {
        let previous = self.lock().remove(feature);
        let was_failed = matches!(previous, Some(FeatureState::Failed { .. }));
        if was_failed {
            info!(feature, "error boundary reset");
        }
        was_failed
    }

    /// Load `feature` through `loader`, recording the outcome.
    ///
    /// A cancelled load leaves the feature idle rather than failed.
    ///
    /// # Errors
    ///
    /// `Tripped` when the feature already failed, otherwise the loader's error.
    pub async fn run<T, E, F, Fut>(
        &self,
        feature: &str,
        loader: &ResourceLoader,
        cancel: &CancelToken,
        op: F,
    ) -> Result<T, BoundaryError<E>>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_when(feature, loader, cancel, |_| true, op).await
    }

    /// [`ErrorBoundary::run`] with a retry filter passed to the loader.
    ///
    /// # Errors
    ///
    /// See [`ErrorBoundary::run`].
    pub async fn run_when<T, E, F, Fut, R>(
        &self,
        feature: &str,
        loader: &ResourceLoader,
        cancel: &CancelToken,
        retryable: R,
        op: F,
    ) -> Result<T, BoundaryError<E>>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
    {
        {
            let mut features = self.lock();
            if let Some(FeatureState::Failed { message, .. }) = features.get(feature) {
                return Err(BoundaryError::Tripped { feature: feature.to_owned(), message: message.clone() });
            }
            features.insert(feature.to_owned(), FeatureState::Loading);
        }
        let pending = Pending { boundary: self, feature };

        let result = loader.load_when(cancel, retryable, op).await;

        let next = match &result {
            Ok(_) => FeatureState::Ready,
            Err(LoadError::Cancelled { .. }) => FeatureState::Idle,
            Err(err @ LoadError::Exhausted { attempts, .. }) => {
                warn!(feature, error = %err, "error boundary tripped");
                FeatureState::Failed { message: err.to_string(), attempts: *attempts }
            }
        };
        pending.settle(next);

        result.map_err(BoundaryError::Load)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, FeatureState>> {
        self.features.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Puts a feature back to `Idle` if its run is dropped before settling.
struct Pending<'a> {
    boundary: &'a ErrorBoundary,
    feature: &'a str,
}

impl Pending<'_> {
    fn settle(self, state: FeatureState) {
        self.boundary.lock().insert(self.feature.to_owned(), state);
        std::mem::forget(self);
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        let mut features = self.boundary.lock();
        if features.get(self.feature) == Some(&FeatureState::Loading) {
            features.insert(self.feature.to_owned(), FeatureState::Idle);
        }
    }
}

#[cfg(test)]
#[path = "boundary_test.rs"]
mod tests;
