//! Error taxonomy.
//!
//! None of these errors is fatal. Validator and request errors are recorded
//! per entity; connection errors are recorded once per channel; malformed
//! push messages are logged and dropped.

use crate::model::EntityKind;
use thiserror::Error;

/// Errors produced while synchronizing workshop state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The transition is not in the lifecycle table.
    ///
    /// Recoverable: the store is left untouched.
    #[error("invalid {kind} transition from {from} to {to}")]
    InvalidTransition {
        /// Entity kind
        kind: EntityKind,
        /// Current status
        from: String,
        /// Attempted status
        to: String,
    },

    /// The transition is allowed but a precondition failed
    #[error("condition not met: {0}")]
    ConditionNotMet(String),

    /// The push channel could not be established or gave up reconnecting.
    ///
    /// Freshness degrades to polling only.
    #[error("push connection error: {0}")]
    ConnectionError(String),

    /// A push envelope was missing required fields or could not be parsed
    #[error("malformed push message: {0}")]
    MalformedMessage(String),

    /// The server rejected a mutation
    #[error("request failed: {detail}")]
    RequestFailed {
        /// Server-reported detail
        detail: String,
    },

    /// A read request failed
    #[error("fetch failed: {detail}")]
    FetchFailed {
        /// Server-reported detail
        detail: String,
    },
}
