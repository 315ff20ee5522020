use std::time::Duration;

use super::*;

#[test]
fn new_token_is_not_cancelled() {
    assert!(!CancelToken::new().is_cancelled());
}

#[test]
fn cancel_is_visible_through_clones() {
    let token = CancelToken::new();
    let clone = token.clone();
    clone.cancel();
    assert!(token.is_cancelled());
}

#[test]
fn parent_cancel_reaches_children_and_grandchildren() {
    let parent = CancelToken::new();
    let child = parent.child();
    let grandchild = child.child();
    parent.cancel();
    assert!(child.is_cancelled());
    assert!(grandchild.is_cancelled());
}

#[test]
fn child_cancel_does_not_reach_parent_or_siblings() {
    let parent = CancelToken::new();
    let a = parent.child();
    let b = parent.child();
    a.cancel();
    assert!(!parent.is_cancelled());
    assert!(!b.is_cancelled());
}

#[test]
fn child_of_cancelled_parent_starts_cancelled() {
    let parent = CancelToken::new();
    parent.cancel();
    assert!(parent.child().is_cancelled());
}

#[tokio::test]
async fn cancelled_resolves_immediately_when_already_cancelled() {
    let token = CancelToken::new();
    token.cancel();
    tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await.unwrap();
}

#[tokio::test]
async fn cancelled_wakes_waiter() {
    let token = CancelToken::new();
    let waiter = {
        let token = token.clone();
        tokio::spawn(async move { token.cancelled().await })
    };
    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());
    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
}

#[tokio::test]
async fn cancelled_pending_while_not_cancelled() {
    let token = CancelToken::new();
    let result = tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
    assert!(result.is_err());
}
