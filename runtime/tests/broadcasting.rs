//! Integration tests for Store action broadcasting
//!
//! Observers see every action produced by effects: fetch completions, timer
//! firings and push events alike.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::sync::Arc;
use std::time::Duration;
use workshop_sync_core::effect::{Effect, TimerId};
use workshop_sync_core::reducer::Reducer;
use workshop_sync_core::{SmallVec, smallvec};
use workshop_sync_runtime::{Store, StoreError};

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum TestAction {
    /// Start a multi-step fetch chain
    FetchChain { id: u64 },
    /// One fetch of the chain finished
    Fetched { id: u64, step: u32 },
    /// The chain finished (terminal action)
    ChainDone { id: u64 },
    /// Arm a one-shot timer
    Arm,
    /// Fired by the timer
    Fired,
}

#[derive(Debug, Clone, Default)]
struct TestState {
    steps: Vec<u32>,
    fired: u32,
}

#[derive(Clone)]
struct TestEnvironment;

#[derive(Clone)]
struct TestReducer;

impl Reducer for TestReducer {
    type State = TestState;
    type Action = TestAction;
    type Environment = TestEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            TestAction::FetchChain { id } => {
                smallvec![Effect::Future(Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Some(TestAction::Fetched { id, step: 1 })
                }))]
            }
            TestAction::Fetched { id, step } => {
                state.steps.push(step);
                if step < 3 {
                    smallvec![Effect::Future(Box::pin(async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Some(TestAction::Fetched { id, step: step + 1 })
                    }))]
                } else {
                    smallvec![Effect::Future(Box::pin(async move {
                        Some(TestAction::ChainDone { id })
                    }))]
                }
            }
            TestAction::ChainDone { .. } => smallvec![Effect::None],
            TestAction::Arm => smallvec![Effect::schedule(
                TimerId::Reconnect,
                Duration::from_secs(1),
                false,
                TestAction::Fired,
            )],
            TestAction::Fired => {
                state.fired += 1;
                SmallVec::new()
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

/// Waiting for a terminal action produced several effects later
#[tokio::test]
async fn send_and_wait_for_follows_the_feedback_loop() {
    let store = Store::new(TestState::default(), TestReducer, TestEnvironment);

    let result = store
        .send_and_wait_for(
            TestAction::FetchChain { id: 7 },
            |action| matches!(action, TestAction::ChainDone { id: 7 }),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(result, TestAction::ChainDone { id: 7 });
    assert_eq!(store.state(|s| s.steps.clone()).await, vec![1, 2, 3]);
}

/// A terminal action that never comes times out
#[tokio::test]
async fn send_and_wait_for_times_out() {
    let store = Store::new(TestState::default(), TestReducer, TestEnvironment);

    let result = store
        .send_and_wait_for(
            TestAction::FetchChain { id: 1 },
            |action| matches!(action, TestAction::ChainDone { id: 2 }),
            Duration::from_millis(5),
        )
        .await;

    assert_eq!(result.unwrap_err(), StoreError::Timeout);
}

/// Timer firings are broadcast like any other effect output
#[tokio::test(start_paused = true)]
async fn timer_firings_are_observable() {
    let store = Arc::new(Store::new(
        TestState::default(),
        TestReducer,
        TestEnvironment,
    ));
    let mut rx = store.subscribe_actions();

    store.send(TestAction::Arm).await.unwrap();
    let observed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timer should fire")
        .unwrap();

    assert_eq!(observed, TestAction::Fired);
    tokio::task::yield_now().await;
    assert_eq!(store.state(|s| s.fired).await, 1);
}

/// Revisions let observers re-render without receiving actions
#[tokio::test]
async fn revision_observers_see_effect_driven_reductions() {
    let store = Store::new(TestState::default(), TestReducer, TestEnvironment);
    let mut revisions = store.subscribe_revisions();

    store
        .send_and_wait_for(
            TestAction::FetchChain { id: 3 },
            |action| matches!(action, TestAction::ChainDone { .. }),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert!(revisions.has_changed().unwrap());
    // FetchChain plus three Fetched
    assert!(*revisions.borrow_and_update() >= 4);
}
