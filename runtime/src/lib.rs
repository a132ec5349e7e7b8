//! # Workshop Sync Runtime
//!
//! Runtime for the workshop sync reducer architecture.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: owns the state and runs the reducer, one action at a time
//! - **Effect Executor**: runs futures, named timers, cache invalidations and
//!   push connection operations, feeding produced actions back to the reducer
//! - **Observers**: effect-produced actions on a broadcast channel and the
//!   state revision on a watch channel
//!
//! ## Example
//!
//! ```ignore
//! use workshop_sync_runtime::Store;
//!
//! let store = Store::new(SyncState::default(), SyncReducer, environment);
//!
//! // Send an action
//! store.send(SyncAction::FetchWorkshops).await?;
//!
//! // Read state
//! let count = store.state(|s| s.entities.workshops().count()).await;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use workshop_sync_core::{effect::Effect, reducer::Reducer};

/// Prometheus metrics for observability
pub mod metrics;

/// Jitter source backed by the thread-local RNG
pub mod jitter;

mod timers;

pub use jitter::ThreadRngJitter;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for an action or for effects to finish
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for the `Future` effects
/// of one action to complete. Timers and push operations are not tracked:
/// they outlive the action that started them.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(SyncAction::FetchWorkshops).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };
        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Wait until every tracked effect has finished
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires before all
    /// effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: effect counter shared between a handle and its running effects
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    /// Increment the effect counter (effect started)
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the effect counter (effect completed)
    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Counter reached zero, notify waiters
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements effect counter on drop
///
/// Ensures the effect counter is always decremented, even if the effect panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, DecrementGuard, Duration, Effect,
        EffectHandle, EffectTracking, Ordering, Reducer, RwLock, StoreError,
    };
    use crate::metrics::PushMetrics;
    use crate::timers::TimerRegistry;
    use futures::StreamExt;
    use std::sync::{Mutex, OnceLock, PoisonError};
    use tokio::sync::{broadcast, mpsc, watch};
    use workshop_sync_core::effect::{PushEventMapper, PushOperation, TimerId, TimerOperation};
    use workshop_sync_core::message::close_code;
    use workshop_sync_core::push::{PushConnection, PushEvent, PushSink, TransportEvent};

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    /// 5. The named timers and the single push connection
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        /// Every action produced by an effect (futures, timers, push events)
        /// is broadcast to observers before it is reduced.
        action_broadcast: broadcast::Sender<A>,
        /// Number of reductions performed so far
        revision: Arc<watch::Sender<u64>>,
        timers: Arc<Mutex<TimerRegistry>>,
        /// Queue of the push worker; created on the first push operation
        push_queue: Arc<OnceLock<mpsc::UnboundedSender<PushOperation<A>>>>,
        push_open: Arc<AtomicBool>,
    }

    /// The live connection owned by the push worker
    #[derive(Default)]
    struct PushSlot {
        sink: Option<Box<dyn PushSink>>,
        reader: Option<tokio::task::JoinHandle<()>>,
    }

    impl PushSlot {
        fn stop_reader(&mut self) {
            if let Some(reader) = self.reader.take() {
                reader.abort();
            }
        }
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Send + Sync + Clone + 'static,
        S: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// The action broadcast buffers 64 actions; use
        /// [`Store::with_broadcast_capacity`] for more.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, environment, 64)
        }

        /// Create a new Store with custom action broadcast capacity
        ///
        /// Increase the capacity if observers frequently lag.
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity.max(1));
            let (revision, _) = watch::channel(0);

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                action_broadcast,
                revision: Arc::new(revision),
                timers: Arc::new(Mutex::new(TimerRegistry::default())),
                push_queue: Arc::new(OnceLock::new()),
                push_open: Arc::new(AtomicBool::new(false)),
            }
        }

        /// Initiate graceful shutdown of the store
        ///
        /// This method:
        /// 1. Sets the shutdown flag (rejecting new actions)
        /// 2. Cancels every timer and closes the push connection
        /// 3. Waits for pending futures to complete (with timeout)
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.store(true, Ordering::Release);
            self.timer_registry().cancel_all();
            if let Some(queue) = self.push_queue.get() {
                let _ = queue.send(PushOperation::Close {
                    code: close_code::INTENTIONAL,
                    reason: "shutdown".to_string(),
                });
            }

            let start = tokio::time::Instant::now();
            let poll_interval = Duration::from_millis(50);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(
                        pending_effects = pending,
                        "Shutdown timeout: {} effects still running", pending
                    );
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tracing::debug!(pending_effects = pending, "Waiting for effects to complete");
                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Publishes the new revision
        /// 4. Starts the returned effects; actions they produce come back here
        ///
        /// `send()` returns once the effects are started, not finished.
        /// Concurrent calls serialize at the reducer.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.commands.total").increment(1);

            let (handle, tracking) = EffectHandle::new();

            let effects = {
                let mut state = self.state.write().await;

                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                self.revision.send_modify(|revision| *revision += 1);
                tracing::trace!("Reducer completed, returned {} effects", effects.len());
                effects
            };

            for effect in effects {
                self.execute_effect(effect, &tracking);
            }

            Ok(handle)
        }

        /// Send an action and wait for a matching action produced by effects
        ///
        /// Subscribes to the action broadcast before sending, so the result
        /// cannot be missed.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: Timeout expired before matching action received
        /// - [`StoreError::ChannelClosed`]: Action broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: Store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        }
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to actions produced by effects
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Subscribe to the state revision, bumped after every reduction
        #[must_use]
        pub fn subscribe_revisions(&self) -> watch::Receiver<u64> {
            self.revision.subscribe()
        }

        /// Read state through a closure
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Timers currently armed
        #[must_use]
        pub fn armed_timers(&self) -> Vec<TimerId> {
            self.timer_registry().armed()
        }

        /// Whether a push connection is currently open
        #[must_use]
        pub fn is_push_open(&self) -> bool {
            self.push_open.load(Ordering::Acquire)
        }

        fn timer_registry(&self) -> std::sync::MutexGuard<'_, TimerRegistry> {
            self.timers.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Broadcast an effect-produced action and reduce it
        async fn feed_back(&self, action: Option<A>) {
            let Some(action) = action else {
                return;
            };
            let _ = self.action_broadcast.send(action.clone());
            if let Err(error) = self.send(action).await {
                tracing::debug!(%error, "Dropped effect-produced action");
            }
        }

        #[tracing::instrument(skip_all, name = "execute_effect")]
        fn execute_effect(&self, effect: Effect<A>, tracking: &EffectTracking) {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                }
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    tracking.increment();

                    self.pending_effects.fetch_add(1, Ordering::SeqCst);
                    let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));
                    let guard = DecrementGuard(tracking.clone());
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = guard;
                        let _pending_guard = pending_guard;
                        store.feed_back(fut.await).await;
                    });
                }
                Effect::Timer(operation) => {
                    metrics::counter!("store.effects.executed", "type" => "timer").increment(1);
                    self.execute_timer(operation);
                }
                Effect::Invalidate { cache, key } => {
                    metrics::counter!("store.effects.executed", "type" => "invalidate")
                        .increment(1);
                    tracing::debug!(%key, "Invalidating query");
                    cache.invalidate(&key);
                }
                Effect::Push(operation) => {
                    metrics::counter!("store.effects.executed", "type" => "push").increment(1);
                    let queue = self.push_queue.get_or_init(|| {
                        let (tx, rx) = mpsc::unbounded_channel();
                        tokio::spawn(self.clone().run_push_worker(rx));
                        tx
                    });
                    if queue.send(operation).is_err() {
                        tracing::warn!("Push worker is gone, operation dropped");
                    }
                }
            }
        }

        fn execute_timer(&self, operation: TimerOperation<A>) {
            match operation {
                TimerOperation::Schedule {
                    id,
                    after,
                    repeat,
                    action,
                } => {
                    if id == TimerId::Reconnect {
                        PushMetrics::record_reconnect_scheduled();
                    }

                    // Held until armed: a timer that fires at once waits here to disarm
                    let mut registry = self.timer_registry();
                    let seq = registry.next_seq();
                    let store = self.clone();

                    let task = tokio::spawn(async move {
                        if repeat {
                            // A zero period would make `interval_at` panic
                            let period = after.max(Duration::from_millis(1));
                            let mut ticks =
                                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                            loop {
                                ticks.tick().await;
                                store.feed_back(Some((*action).clone())).await;
                            }
                        } else {
                            tokio::time::sleep(after).await;
                            store.timer_registry().disarm(id, seq);
                            store.feed_back(Some(*action)).await;
                        }
                    });

                    registry.arm(id, seq, task.abort_handle());
                    tracing::debug!(?id, ?after, repeat, "Timer scheduled");
                }
                TimerOperation::Cancel { id } => {
                    if self.timer_registry().cancel(id) {
                        tracing::debug!(?id, "Timer cancelled");
                    }
                }
            }
        }

        /// Executes push operations one at a time, in the order they were
        /// returned by the reducer.
        async fn run_push_worker(self, mut queue: mpsc::UnboundedReceiver<PushOperation<A>>) {
            let mut slot = PushSlot::default();

            while let Some(operation) = queue.recv().await {
                match operation {
                    PushOperation::Open {
                        transport,
                        on_event,
                    } => {
                        slot.stop_reader();
                        slot.sink = None;
                        self.push_open.store(false, Ordering::Release);

                        match transport.connect().await {
                            Ok(connection) => {
                                tracing::info!("Push connection opened");
                                PushMetrics::record_opened();
                                self.push_open.store(true, Ordering::Release);
                                let PushConnection { sink, events } = connection;
                                slot.sink = Some(sink);
                                self.feed_back(on_event(PushEvent::Opened)).await;
                                slot.reader = Some(tokio::spawn(
                                    self.clone().read_events(events, on_event),
                                ));
                            }
                            Err(error) => {
                                tracing::warn!(%error, "Push connection failed");
                                self.feed_back(on_event(PushEvent::Closed {
                                    code: None,
                                    reason: error.to_string(),
                                }))
                                .await;
                            }
                        }
                    }
                    PushOperation::Send { message } => {
                        let Some(sink) = slot.sink.as_mut() else {
                            tracing::debug!(?message, "No open push connection, message dropped");
                            continue;
                        };
                        match message.to_text() {
                            Ok(text) => {
                                if let Err(error) = sink.send_text(text).await {
                                    tracing::warn!(%error, "Push send failed");
                                }
                            }
                            Err(error) => tracing::warn!(%error, "Push message not serializable"),
                        }
                    }
                    PushOperation::Close { code, reason } => {
                        slot.stop_reader();
                        self.push_open.store(false, Ordering::Release);
                        if let Some(mut sink) = slot.sink.take() {
                            tracing::info!(code, %reason, "Closing push connection");
                            if let Err(error) = sink.close(code, reason).await {
                                tracing::debug!(%error, "Push close failed");
                            }
                        }
                    }
                }
            }
        }

        /// Forward transport events of one connection until it ends
        async fn read_events(
            self,
            mut events: futures::stream::BoxStream<'static, TransportEvent>,
            on_event: PushEventMapper<A>,
        ) {
            while let Some(event) = events.next().await {
                let event = match event {
                    TransportEvent::Text(text) => PushEvent::Message(text),
                    TransportEvent::Closed(code) => PushEvent::Closed {
                        code,
                        reason: String::new(),
                    },
                    TransportEvent::Error(reason) => PushEvent::Closed { code: None, reason },
                };

                if let PushEvent::Closed { code, .. } = &event {
                    tracing::info!(?code, "Push connection closed");
                    self.push_open.store(false, Ordering::Release);
                    self.feed_back(on_event(event)).await;
                    return;
                }
                self.feed_back(on_event(event)).await;
            }

            // Stream ended without a close frame
            self.push_open.store(false, Ordering::Release);
            self.feed_back(on_event(PushEvent::Closed {
                code: Some(close_code::ABNORMAL),
                reason: "connection lost".to_string(),
            }))
            .await;
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                action_broadcast: self.action_broadcast.clone(),
                revision: Arc::clone(&self.revision),
                timers: Arc::clone(&self.timers),
                push_queue: Arc::clone(&self.push_queue),
                push_open: Arc::clone(&self.push_open),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;
