use std::time::Duration;

use super::*;
use crate::api::test_helpers::{ScriptedProfileApi, user};
use crate::role::Role;

fn store_with(responses: Vec<Result<User, ApiError>>) -> (SessionStore, Arc<ScriptedProfileApi>) {
    let api = Arc::new(ScriptedProfileApi::new(responses));
    (SessionStore::new(api.clone()), api)
}

// =============================================================================
// fetch_user
// =============================================================================

#[tokio::test]
async fn new_store_is_empty() {
    let (store, _) = store_with(vec![]);
    assert_eq!(store.state(), SessionState::default());
}

#[tokio::test]
async fn fetch_success_stores_user_and_clears_error() {
    let (store, api) = store_with(vec![Err(ApiError::Timeout), Ok(user("1", Role::Patient))]);
    let cancel = CancelToken::new();

    assert!(store.fetch_user("tok", &cancel).await.is_err());
    assert_eq!(store.state().error, Some(ApiError::Timeout));

    let fetched = store.fetch_user("tok", &cancel).await.unwrap();
    let state = store.state();
    assert_eq!(fetched.role, Role::Patient);
    assert_eq!(state.user, Some(fetched));
    assert_eq!(state.error, None);
    assert!(state.fetched_at.is_some());
    assert!(!state.loading);
    assert_eq!(api.calls(), 2);
    assert_eq!(api.seen_tokens(), vec!["tok".to_owned(), "tok".to_owned()]);
}

#[tokio::test]
async fn fetch_failure_keeps_cached_user() {
    let cached = user("1", Role::Doctor);
    let (store, _) = store_with(vec![Ok(cached.clone()), Err(ApiError::Network("reset".into()))]);
    let cancel = CancelToken::new();

    store.fetch_user("tok", &cancel).await.unwrap();
    let err = store.fetch_user("tok", &cancel).await.unwrap_err();

    assert_eq!(err, ApiError::Network("reset".into()));
    let state = store.state();
    assert_eq!(state.user, Some(cached));
    assert_eq!(state.error, Some(ApiError::Network("reset".into())));
}

#[tokio::test]
async fn fetch_failure_does_not_retry() {
    let (store, api) = store_with(vec![Err(ApiError::Timeout), Ok(user("1", Role::Patient))]);
    assert!(store.fetch_user("tok", &CancelToken::new()).await.is_err());
    assert_eq!(api.calls(), 1);
}

#[tokio::test]
async fn sequential_fetches_are_idempotent_without_flicker() {
    let patient = user("1", Role::Patient);
    let (api, gate) = ScriptedProfileApi::gated(vec![Ok(patient.clone()), Ok(patient.clone())]);
    let store = Arc::new(SessionStore::new(Arc::new(api)));
    let cancel = CancelToken::new();

    gate.notify_one();
    store.fetch_user("tok", &cancel).await.unwrap();
    assert_eq!(store.cached_user(), Some(patient.clone()));

    let second = {
        let store = store.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { store.fetch_user("tok", &cancel).await })
    };
    store.subscribe().wait_for(|s| s.loading).await.unwrap();
    assert_eq!(store.cached_user(), Some(patient.clone()));

    gate.notify_one();
    second.await.unwrap().unwrap();
    assert_eq!(store.state().user, Some(patient));
    assert_eq!(store.state().error, None);
}

#[tokio::test]
async fn loading_is_true_only_while_in_flight() {
    let (api, gate) = ScriptedProfileApi::gated(vec![Ok(user("1", Role::Patient))]);
    let store = Arc::new(SessionStore::new(Arc::new(api)));

    let task = {
        let store = store.clone();
        tokio::spawn(async move { store.fetch_user("tok", &CancelToken::new()).await })
    };
    let mut rx = store.subscribe();
    rx.wait_for(|s| s.loading).await.unwrap();
    assert!(store.is_loading());

    gate.notify_one();
    task.await.unwrap().unwrap();
    assert!(!store.is_loading());
}

// =============================================================================
// cancellation and clear
// =============================================================================

#[tokio::test]
async fn cancelled_fetch_leaves_state_untouched() {
    let (api, _gate) = ScriptedProfileApi::gated(vec![Ok(user("1", Role::Patient))]);
    let store = Arc::new(SessionStore::new(Arc::new(api)));
    let cancel = CancelToken::new();

    let task = {
        let store = store.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { store.fetch_user("tok", &cancel).await })
    };
    store.subscribe().wait_for(|s| s.loading).await.unwrap();
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    assert_eq!(result, Err(ApiError::Cancelled));
    let state = store.state();
    assert_eq!(state.user, None);
    assert_eq!(state.error, None);
    assert!(!state.loading);
}

#[tokio::test]
async fn already_cancelled_token_never_stores_a_user() {
    let (store, _) = store_with(vec![Ok(user("1", Role::Patient))]);
    let cancel = CancelToken::new();
    cancel.cancel();
    assert_eq!(store.fetch_user("tok", &cancel).await, Err(ApiError::Cancelled));
    assert_eq!(store.cached_user(), None);
}

#[tokio::test]
async fn clear_during_fetch_discards_late_result() {
    let (api, gate) = ScriptedProfileApi::gated(vec![Ok(user("1", Role::Patient))]);
    let store = Arc::new(SessionStore::new(Arc::new(api)));

    let task = {
        let store = store.clone();
        tokio::spawn(async move { store.fetch_user("tok", &CancelToken::new()).await })
    };
    store.subscribe().wait_for(|s| s.loading).await.unwrap();
    store.clear();
    gate.notify_one();

    assert_eq!(task.await.unwrap(), Err(ApiError::Cancelled));
    assert_eq!(store.cached_user(), None);
    assert!(!store.is_loading());
}

#[tokio::test]
async fn dropped_fetch_future_releases_loading() {
    let (api, _gate) = ScriptedProfileApi::gated(vec![Ok(user("1", Role::Patient))]);
    let store = SessionStore::new(Arc::new(api));
    let cancel = CancelToken::new();

    let result = tokio::time::timeout(Duration::from_millis(20), store.fetch_user("tok", &cancel)).await;
    assert!(result.is_err());
    assert!(!store.is_loading());
}

#[tokio::test]
async fn clear_resets_user_error_and_timestamp() {
    let (store, _) = store_with(vec![Ok(user("1", Role::Patient))]);
    store.fetch_user("tok", &CancelToken::new()).await.unwrap();
    store.clear();
    assert_eq!(store.state(), SessionState::default());
}

/// Parks the `hold` token until released; answers every other token at once.
struct HoldOneApi {
    release: tokio::sync::Notify,
}

#[async_trait::async_trait]
impl ProfileApi for HoldOneApi {
    async fn fetch_profile(&self, token: &str) -> Result<User, ApiError> {
        if token == "hold" {
            self.release.notified().await;
        } else {
            tokio::task::yield_now().await;
        }
        Ok(user("1", Role::Patient))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_fetches_never_clear_loading_early() {
    let api = Arc::new(HoldOneApi { release: tokio::sync::Notify::new() });
    let store = Arc::new(SessionStore::new(api.clone()));

    let held = {
        let store = store.clone();
        tokio::spawn(async move { store.fetch_user("hold", &CancelToken::new()).await })
    };
    store.subscribe().wait_for(|s| s.loading).await.unwrap();

    let mut quick = Vec::new();
    for _ in 0..64 {
        let store = store.clone();
        quick.push(tokio::spawn(async move { store.fetch_user("quick", &CancelToken::new()).await }));
    }
    for task in quick {
        task.await.unwrap().unwrap();
    }
    assert!(store.is_loading(), "held fetch is still in flight");

    api.release.notify_one();
    held.await.unwrap().unwrap();
    assert!(!store.is_loading());
}
