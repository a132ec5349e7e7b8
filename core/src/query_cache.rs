//! Boundary to the polling layer.

use crate::message::QueryKey;

/// A cache of fetched queries that can be told an entry is stale.
///
/// Invalidation is a signal, not a fetch: the cache decides when to re-fetch.
/// Implementations must not block.
pub trait QueryCache: Send + Sync {
    /// Mark the query identified by `key` as stale
    fn invalidate(&self, key: &QueryKey);
}
