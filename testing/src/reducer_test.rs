//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use workshop_sync_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// When several actions are given, they are reduced in order and the effect
/// assertions see the effects of the last one only.
///
/// # Example
///
/// ```ignore
/// use workshop_sync_testing::ReducerTest;
///
/// ReducerTest::new(SyncReducer)
///     .with_env(test_environment())
///     .given_state(state_with_workshop())
///     .when_action(SyncAction::Deploy(EntityRef::Workshop(w1())))
///     .then_state(|state| {
///         assert_eq!(state.displayed_workshop_status(&w1()), Some(WorkshopStatus::Deploying));
///     })
///     .then_effects(|effects| {
///         assertions::assert_has_future_effect(effects);
///     })
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    actions: Vec<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
    S: Clone,
    A: Clone,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            actions: Vec::new(),
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Add an action to reduce (When)
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Add several actions to reduce in order (When)
    #[must_use]
    pub fn when_actions(mut self, actions: impl IntoIterator<Item = A>) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the effects of the last action (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        assert!(
            !self.actions.is_empty(),
            "At least one action must be set with when_action()"
        );

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        let mut effects = Vec::new();
        for action in self.actions {
            effects = self.reducer.reduce(&mut state, action, &env).into_vec();
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }

        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

/// Helper assertions and extractors for effects
pub mod assertions {
    use std::time::Duration;
    use workshop_sync_core::effect::{Effect, PushOperation, TimerId, TimerOperation};
    use workshop_sync_core::message::{OutboundMessage, QueryKey};

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if effects is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().all(|e| matches!(e, Effect::None)),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that effects contain at least one Future effect
    ///
    /// # Panics
    ///
    /// Panics if no Future effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().any(|e| matches!(e, Effect::Future(_))),
            "Expected at least one Future effect, but none found"
        );
    }

    /// Assert that effects contain no Future effect (no request is sent)
    ///
    /// # Panics
    ///
    /// Panics if a Future effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            !effects.iter().any(|e| matches!(e, Effect::Future(_))),
            "Expected no Future effect, but found one"
        );
    }

    /// Keys invalidated by the effects, in order
    #[must_use]
    pub fn invalidated_keys<A>(effects: &[Effect<A>]) -> Vec<QueryKey> {
        effects
            .iter()
            .filter_map(Effect::invalidated_key)
            .cloned()
            .collect()
    }

    /// Assert that exactly `expected` keys are invalidated, in any order
    ///
    /// # Panics
    ///
    /// Panics if the invalidated keys differ from `expected`.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_invalidated<A>(effects: &[Effect<A>], expected: &[QueryKey]) {
        let mut actual = invalidated_keys(effects);
        let mut expected = expected.to_vec();
        actual.sort();
        expected.sort();
        assert_eq!(actual, expected, "Unexpected invalidations");
    }

    /// Timers scheduled by the effects, with their delay and repeat flag
    #[must_use]
    pub fn scheduled_timers<A>(effects: &[Effect<A>]) -> Vec<(TimerId, Duration, bool)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Timer(TimerOperation::Schedule {
                    id, after, repeat, ..
                }) => Some((*id, *after, *repeat)),
                _ => None,
            })
            .collect()
    }

    /// Timers cancelled by the effects
    #[must_use]
    pub fn cancelled_timers<A>(effects: &[Effect<A>]) -> Vec<TimerId> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Timer(TimerOperation::Cancel { id }) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Number of push connections the effects open
    #[must_use]
    pub fn push_opens<A>(effects: &[Effect<A>]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::Push(PushOperation::Open { .. })))
            .count()
    }

    /// Messages the effects send on the push connection
    #[must_use]
    pub fn push_sends<A>(effects: &[Effect<A>]) -> Vec<OutboundMessage> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Push(PushOperation::Send { message }) => Some(*message),
                _ => None,
            })
            .collect()
    }

    /// Close codes the effects send on the push connection
    #[must_use]
    pub fn push_closes<A>(effects: &[Effect<A>]) -> Vec<u16> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Push(PushOperation::Close { code, .. }) => Some(*code),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use workshop_sync_core::effect::{Effect, TimerId};
    use workshop_sync_core::reducer::Reducer;

    #[derive(Clone, Debug)]
    struct TestState {
        count: i32,
    }

    #[derive(Clone, Debug)]
    enum TestAction {
        Increment,
        Decrement,
        Arm,
    }

    struct TestReducer;

    struct TestEnv;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> smallvec::SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.count += 1;
                    smallvec::smallvec![Effect::None]
                }
                TestAction::Decrement => {
                    state.count -= 1;
                    smallvec::smallvec![Effect::None]
                }
                TestAction::Arm => smallvec::smallvec![
                    Effect::cancel(TimerId::LivenessProbe),
                    Effect::schedule(
                        TimerId::Reconnect,
                        Duration::from_secs(2),
                        false,
                        TestAction::Increment,
                    ),
                ],
            }
        }
    }

    #[test]
    fn test_reducer_test_increment() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Increment)
            .then_state(|state| {
                assert_eq!(state.count, 1);
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[test]
    fn test_reducer_test_action_sequence() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 5 })
            .when_actions([TestAction::Decrement, TestAction::Decrement, TestAction::Arm])
            .then_state(|state| {
                assert_eq!(state.count, 3);
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 2);
                assert_eq!(
                    assertions::scheduled_timers(effects),
                    vec![(TimerId::Reconnect, Duration::from_secs(2), false)]
                );
                assert_eq!(
                    assertions::cancelled_timers(effects),
                    vec![TimerId::LivenessProbe]
                );
            })
            .run();
    }

    #[test]
    fn test_assertions_no_effects() {
        assertions::assert_no_effects::<TestAction>(&[Effect::None]);
        assertions::assert_no_effects::<TestAction>(&[]);
    }
}
