//! # Workshop Sync Client
//!
//! The application layer over the sync core: state, actions and the reducer
//! that reconciles fetched, predicted and pushed workshop data, plus the
//! pieces that connect it to a real server.
//!
//! - [`SyncReducer`] / [`SyncState`] / [`SyncAction`]: the business logic
//! - [`SyncEnvironment`]: injected API, transport, cache, clock and jitter
//! - [`channel::PushChannel`]: reference-counted ownership of the push channel
//! - [`bridge::PollingBridge`]: turns cache invalidations into fetches and polls
//! - [`http::HttpWorkshopApi`] and [`ws::WsPushTransport`]: network adapters
//! - [`config::SyncConfig`]: environment-driven configuration
//!
//! ## Example
//!
//! ```ignore
//! let (bridge, worker) = PollingBridge::new(config.poll_interval());
//! let env = SyncEnvironment::new(api, transport, Arc::new(bridge), clock, jitter);
//! let store: SyncStore = Store::new(SyncState::new(), SyncReducer::new(), env);
//! worker.spawn(store.clone());
//!
//! let channel = PushChannel::new(store.clone());
//! let lease = channel.acquire().await?;
//! store.send(SyncAction::Deploy(EntityRef::Workshop(id))).await?;
//! ```

pub mod actions;
pub mod bridge;
pub mod channel;
pub mod config;
pub mod environment;
pub mod http;
pub mod reducer;
pub mod state;
pub mod ws;

pub use actions::SyncAction;
pub use environment::SyncEnvironment;
pub use reducer::SyncReducer;
pub use state::SyncState;

/// The runtime store driving the sync reducer
pub type SyncStore =
    workshop_sync_runtime::Store<SyncState, SyncAction, SyncEnvironment, SyncReducer>;
