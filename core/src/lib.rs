//! # Workshop Sync Core
//!
//! Domain model and pure decision logic for keeping a client-side view of
//! workshops and their attendees in step with a server.
//!
//! Three sources of truth compete for every entity:
//!
//! - the last value fetched from the server (authoritative),
//! - a value predicted locally the moment a user acts (optimistic),
//! - a push notification saying the value changed and must be re-fetched.
//!
//! This crate holds everything needed to reconcile them without doing any I/O:
//!
//! - [`model`]: workshops, attendees, ids and lifecycle statuses
//! - [`transition`]: the legal state graphs and the validator
//! - [`effective`]: the workshop state derived from its attendees
//! - [`overlay`]: the optimistic prediction map
//! - [`entity_store`]: the normalized store and its command entry point
//! - [`message`]: the push envelope, outgoing probes and query keys
//! - [`backoff`]: reconnect delay policy
//! - [`error`]: the error taxonomy
//! - [`api`], [`push`], [`query_cache`]: the collaborator traits
//!
//! The [`reducer::Reducer`] trait and [`effect::Effect`] descriptions are the
//! seam between this functional core and the runtime that executes effects.
//!
//! ## Example
//!
//! ```
//! use workshop_sync_core::effective::calculate_workshop_state;
//! use workshop_sync_core::model::{AttendeeStatus, WorkshopStatus};
//!
//! let state = calculate_workshop_state(&[AttendeeStatus::Deploying, AttendeeStatus::Active]);
//! assert_eq!(state, WorkshopStatus::Deploying);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

pub mod api;
pub mod backoff;
pub mod effective;
pub mod entity_store;
pub mod error;
pub mod message;
pub mod model;
pub mod overlay;
pub mod push;
pub mod query_cache;
pub mod transition;

pub use error::SyncError;

/// Reducer module - the trait every piece of business logic implements.
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
pub mod reducer {
    use super::SmallVec;
    use super::effect::Effect;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for SyncReducer {
    ///     type State = SyncState;
    ///     type Action = SyncAction;
    ///     type Environment = SyncEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut SyncState,
    ///         action: SyncAction,
    ///         env: &SyncEnvironment,
    ///     ) -> SmallVec<[Effect<SyncAction>; 4]> {
    ///         match action {
    ///             SyncAction::WorkshopFetched(workshop) => {
    ///                 state.apply(StoreCommand::PutWorkshop(workshop));
    ///                 SmallVec::new()
    ///             }
    ///             _ => SmallVec::new(),
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - side effect descriptions.
///
/// Effects are values returned by reducers and executed by the runtime store.
/// A reducer never touches the network, a timer or the query cache directly.
pub mod effect {
    use crate::message::{OutboundMessage, QueryKey};
    use crate::push::{PushEvent, PushTransport};
    use crate::query_cache::QueryCache;
    use std::fmt;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::time::Duration;

    /// Maps a transport event to the action fed back into the store.
    pub type PushEventMapper<Action> = Arc<dyn Fn(PushEvent) -> Option<Action> + Send + Sync>;

    /// Named timers owned by the runtime.
    ///
    /// Scheduling a timer replaces any pending timer with the same id.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum TimerId {
        /// Periodic `ping` while the push channel is open
        LivenessProbe,
        /// Backoff delay before the next connection attempt
        Reconnect,
    }

    /// Effect type - describes a side effect to be executed
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Arbitrary async computation (fetches and mutations)
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

        /// Schedule or cancel a named timer
        Timer(TimerOperation<Action>),

        /// Mark a cached query as stale
        Invalidate {
            /// Cache to notify
            cache: Arc<dyn QueryCache>,
            /// Key of the stale query
            key: QueryKey,
        },

        /// Operate the single push connection
        Push(PushOperation<Action>),
    }

    /// Timer operations.
    pub enum TimerOperation<Action> {
        /// Fire `action` after `after`; re-arm every `after` when `repeat` is set
        Schedule {
            /// Timer slot
            id: TimerId,
            /// Delay (and period when repeating)
            after: Duration,
            /// Whether the timer re-arms after firing
            repeat: bool,
            /// Action dispatched on every firing
            action: Box<Action>,
        },
        /// Cancel a pending timer. Cancelling an idle slot is a no-op.
        Cancel {
            /// Timer slot
            id: TimerId,
        },
    }

    /// Push connection operations.
    pub enum PushOperation<Action> {
        /// Open a new connection, replacing any connection still in the slot
        Open {
            /// Transport used to establish the socket
            transport: Arc<dyn PushTransport>,
            /// Translates every transport event into an action
            on_event: PushEventMapper<Action>,
        },
        /// Send a message on the open connection (dropped when none is open)
        Send {
            /// Message to serialize and send
            message: OutboundMessage,
        },
        /// Close the open connection (no-op when none is open)
        Close {
            /// WebSocket close code
            code: u16,
            /// Close reason
            reason: String,
        },
    }

    // Manual Debug implementation since Future and trait objects don't implement Debug
    impl<Action> fmt::Debug for Effect<Action>
    where
        Action: fmt::Debug,
    {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
                Effect::Timer(TimerOperation::Schedule {
                    id,
                    after,
                    repeat,
                    action,
                }) => f
                    .debug_struct("Effect::Timer::Schedule")
                    .field("id", id)
                    .field("after", after)
                    .field("repeat", repeat)
                    .field("action", action)
                    .finish(),
                Effect::Timer(TimerOperation::Cancel { id }) => f
                    .debug_struct("Effect::Timer::Cancel")
                    .field("id", id)
                    .finish(),
                Effect::Invalidate { key, .. } => f
                    .debug_struct("Effect::Invalidate")
                    .field("key", key)
                    .finish_non_exhaustive(),
                Effect::Push(PushOperation::Open { .. }) => write!(f, "Effect::Push::Open"),
                Effect::Push(PushOperation::Send { message }) => f
                    .debug_struct("Effect::Push::Send")
                    .field("message", message)
                    .finish(),
                Effect::Push(PushOperation::Close { code, reason }) => f
                    .debug_struct("Effect::Push::Close")
                    .field("code", code)
                    .field("reason", reason)
                    .finish(),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Schedule a one-shot or repeating timer
        #[must_use]
        pub fn schedule(id: TimerId, after: Duration, repeat: bool, action: Action) -> Self {
            Effect::Timer(TimerOperation::Schedule {
                id,
                after,
                repeat,
                action: Box::new(action),
            })
        }

        /// Cancel a timer slot
        #[must_use]
        pub const fn cancel(id: TimerId) -> Self {
            Effect::Timer(TimerOperation::Cancel { id })
        }

        /// Invalidate a cached query
        #[must_use]
        pub fn invalidate(cache: &Arc<dyn QueryCache>, key: QueryKey) -> Self {
            Effect::Invalidate {
                cache: Arc::clone(cache),
                key,
            }
        }

        /// Returns the invalidated key if this is an [`Effect::Invalidate`]
        #[must_use]
        pub const fn invalidated_key(&self) -> Option<&QueryKey> {
            match self {
                Effect::Invalidate { key, .. } => Some(key),
                _ => None,
            }
        }
    }
}

/// Environment module - dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the reducer's environment.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of randomness for backoff jitter
    ///
    /// `sample` returns a value in `[0.0, 1.0)`.
    pub trait JitterSource: Send + Sync {
        /// Draw one sample
        fn sample(&self) -> f64;
    }
}
