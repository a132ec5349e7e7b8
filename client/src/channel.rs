//! Shared ownership of the single push connection.
//!
//! Consumers that want live updates hold a [`ChannelLease`]. The first lease
//! connects the channel and the last one released disconnects it, so there
//! is exactly one connection per store however many views want it. A channel
//! that closed while leases were held is reopened by the next lease.

use crate::SyncStore;
use crate::actions::SyncAction;
use crate::state::ChannelPhase;
use std::sync::Arc;
use tokio::sync::Mutex;
use workshop_sync_runtime::StoreError;

struct Shared {
    store: SyncStore,
    /// Held across the `Connect`/`Disconnect` send so they cannot reorder
    leases: Mutex<usize>,
}

/// Reference-counted handle on the push channel of a store
#[derive(Clone)]
pub struct PushChannel {
    shared: Arc<Shared>,
}

impl PushChannel {
    /// Creates a handle with no leases
    #[must_use]
    pub fn new(store: SyncStore) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                leases: Mutex::new(0),
            }),
        }
    }

    /// Take a lease, connecting the channel if it is the first one or the
    /// channel has closed.
    ///
    /// # Errors
    ///
    /// Returns the store's error if `Connect` could not be sent; no lease is
    /// taken in that case.
    pub async fn acquire(&self) -> Result<ChannelLease, StoreError> {
        let mut leases = self.shared.leases.lock().await;
        let closed = self
            .shared
            .store
            .state(|state| state.channel.phase == ChannelPhase::Closed)
            .await;
        if *leases == 0 || closed {
            self.shared.store.send(SyncAction::Connect).await?;
        }
        *leases += 1;
        tracing::debug!(leases = *leases, "Push channel lease acquired");

        Ok(ChannelLease {
            shared: Some(Arc::clone(&self.shared)),
        })
    }

    /// Number of live leases
    pub async fn lease_count(&self) -> usize {
        *self.shared.leases.lock().await
    }
}

impl Shared {
    async fn release(&self) -> Result<(), StoreError> {
        let mut leases = self.leases.lock().await;
        *leases = leases.saturating_sub(1);
        tracing::debug!(leases = *leases, "Push channel lease released");
        if *leases == 0 {
            self.store.send(SyncAction::Disconnect).await?;
        }
        Ok(())
    }
}

/// Keeps the push channel connected while alive.
///
/// Prefer [`ChannelLease::release`]; dropping the lease releases it from a
/// spawned task.
pub struct ChannelLease {
    shared: Option<Arc<Shared>>,
}

impl ChannelLease {
    /// Give the lease back, disconnecting if it was the last one.
    ///
    /// # Errors
    ///
    /// Returns the store's error if `Disconnect` could not be sent.
    pub async fn release(mut self) -> Result<(), StoreError> {
        match self.shared.take() {
            Some(shared) => shared.release().await,
            None => Ok(()),
        }
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        let Some(shared) = self.shared.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(error) = shared.release().await {
                        tracing::warn!(%error, "Failed to release dropped push channel lease");
                    }
                });
            }
            Err(_) => tracing::warn!("Push channel lease dropped outside a runtime"),
        }
    }
}

impl std::fmt::Debug for ChannelLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelLease")
            .field("released", &self.shared.is_none())
            .finish()
    }
}
