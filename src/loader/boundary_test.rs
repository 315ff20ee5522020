use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::*;
use crate::api::ApiError;
use crate::loader::RetryPolicy;

fn loader(name: &str) -> ResourceLoader {
    ResourceLoader::new(
        name,
        RetryPolicy { max_attempts: 2, base_delay: Duration::from_millis(10), max_delay: Duration::from_millis(10) },
    )
}

async fn fail(boundary: &ErrorBoundary, feature: &str) -> BoundaryError<ApiError> {
    boundary
        .run(feature, &loader(feature), &CancelToken::new(), |_| async { Err::<(), _>(ApiError::Timeout) })
        .await
        .unwrap_err()
}

#[test]
fn unknown_feature_is_idle() {
    assert_eq!(ErrorBoundary::new().state("billing"), FeatureState::Idle);
}

#[tokio::test(start_paused = true)]
async fn success_marks_feature_ready() {
    let boundary = ErrorBoundary::new();
    let value = boundary
        .run("records", &loader("records"), &CancelToken::new(), |_| async { Ok::<_, ApiError>(7) })
        .await
        .unwrap();
    assert_eq!(value, 7);
    assert_eq!(boundary.state("records"), FeatureState::Ready);
}

#[tokio::test(start_paused = true)]
async fn exhausted_load_trips_only_that_feature() {
    let boundary = ErrorBoundary::new();
    let err = fail(&boundary, "appointments").await;
    assert!(matches!(err, BoundaryError::Load(LoadError::Exhausted { attempts: 2, .. })));

    match boundary.state("appointments") {
        FeatureState::Failed { message, attempts } => {
            assert_eq!(attempts, 2);
            assert!(message.contains("appointments"), "{message}");
        }
        other => panic!("expected failed state, got {other:?}"),
    }

    let ok = boundary
        .run("records", &loader("records"), &CancelToken::new(), |_| async { Ok::<_, ApiError>("loaded") })
        .await
        .unwrap();
    assert_eq!(ok, "loaded");
    assert_eq!(boundary.failed(), vec!["appointments".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn tripped_feature_refuses_until_reset() {
    let boundary = ErrorBoundary::new();
    fail(&boundary, "billing").await;

    let calls = AtomicU32::new(0);
    let err = boundary
        .run("billing", &loader("billing"), &CancelToken::new(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ApiError>(()) }
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BoundaryError::Tripped { ref feature, .. } if feature == "billing"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert!(boundary.reset("billing"));
    assert!(!boundary.reset("billing"));
    boundary
        .run("billing", &loader("billing"), &CancelToken::new(), |_| async { Ok::<_, ApiError>(()) })
        .await
        .unwrap();
    assert_eq!(boundary.state("billing"), FeatureState::Ready);
    assert!(boundary.failed().is_empty());
}

#[tokio::test]
async fn cancelled_load_leaves_feature_idle() {
    let boundary = ErrorBoundary::new();
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = boundary
        .run("staff", &loader("staff"), &cancel, |_| async { Ok::<_, ApiError>(()) })
        .await
        .unwrap_err();
    assert!(matches!(err, BoundaryError::Load(LoadError::Cancelled { .. })));
    assert_eq!(boundary.state("staff"), FeatureState::Idle);
}

#[tokio::test]
async fn dropped_run_returns_feature_to_idle() {
    let boundary = ErrorBoundary::new();
    let chat = loader("chat");
    let cancel = CancelToken::new();

    let mut run = Box::pin(boundary.run("chat", &chat, &cancel, |_| std::future::pending::<Result<(), ApiError>>()));
    tokio::select! {
        biased;
        _ = &mut run => panic!("pending load finished"),
        () = std::future::ready(()) => {}
    }
    assert_eq!(boundary.state("chat"), FeatureState::Loading);

    drop(run);
    assert_eq!(boundary.state("chat"), FeatureState::Idle);
}
