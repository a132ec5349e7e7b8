//! Injected dependencies of the sync reducer.

use std::sync::Arc;
use std::time::Duration;
use workshop_sync_core::api::WorkshopApi;
use workshop_sync_core::backoff::ReconnectPolicy;
use workshop_sync_core::environment::{Clock, JitterSource};
use workshop_sync_core::push::PushTransport;
use workshop_sync_core::query_cache::QueryCache;

/// Default period of the liveness probe
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Environment for [`crate::SyncReducer`]
#[derive(Clone)]
pub struct SyncEnvironment {
    /// Fetches and mutations
    pub api: Arc<dyn WorkshopApi>,
    /// Opens push connections
    pub transport: Arc<dyn PushTransport>,
    /// Told which queries went stale
    pub cache: Arc<dyn QueryCache>,
    /// Timestamps recorded errors
    pub clock: Arc<dyn Clock>,
    /// Randomizes reconnect delays
    pub jitter: Arc<dyn JitterSource>,
    /// Reconnect backoff
    pub reconnect: ReconnectPolicy,
    /// Period of the liveness probe while the channel is open
    pub ping_interval: Duration,
}

impl SyncEnvironment {
    /// Creates an environment with the default reconnect policy and ping interval
    pub fn new(
        api: Arc<dyn WorkshopApi>,
        transport: Arc<dyn PushTransport>,
        cache: Arc<dyn QueryCache>,
        clock: Arc<dyn Clock>,
        jitter: Arc<dyn JitterSource>,
    ) -> Self {
        Self {
            api,
            transport,
            cache,
            clock,
            jitter,
            reconnect: ReconnectPolicy::default(),
            ping_interval: DEFAULT_PING_INTERVAL,
        }
    }

    /// Replace the reconnect policy
    #[must_use]
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Replace the liveness probe period
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }
}
