//! Polling bridge: the query cache seen by the reducer.
//!
//! Invalidations are queued and turned into fetch actions by a worker task,
//! which also refreshes every known workshop on a fixed interval so that
//! data stays fresh when the push channel is down.

use crate::SyncStore;
use crate::actions::SyncAction;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use workshop_sync_core::message::QueryKey;
use workshop_sync_core::model::WorkshopId;
use workshop_sync_core::query_cache::QueryCache;
use workshop_sync_runtime::StoreError;

/// [`QueryCache`] that queues stale keys for the [`PollingWorker`]
#[derive(Debug, Clone)]
pub struct PollingBridge {
    queue: mpsc::UnboundedSender<QueryKey>,
}

impl PollingBridge {
    /// Create the bridge and the worker draining it
    #[must_use]
    pub fn new(poll_interval: Duration) -> (Self, PollingWorker) {
        let (queue, keys) = mpsc::unbounded_channel();
        (
            Self { queue },
            PollingWorker {
                keys,
                poll_interval,
            },
        )
    }
}

impl QueryCache for PollingBridge {
    fn invalidate(&self, key: &QueryKey) {
        tracing::trace!(%key, "Query invalidated");
        if self.queue.send(key.clone()).is_err() {
            tracing::debug!(%key, "Polling worker stopped, invalidation dropped");
        }
    }
}

/// Task turning invalidations and poll ticks into fetches
#[derive(Debug)]
pub struct PollingWorker {
    keys: mpsc::UnboundedReceiver<QueryKey>,
    poll_interval: Duration,
}

impl PollingWorker {
    /// Run the worker on the current runtime until the store shuts down
    pub fn spawn(self, store: SyncStore) -> JoinHandle<()> {
        tokio::spawn(self.run(store))
    }

    async fn run(mut self, store: SyncStore) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            let actions = tokio::select! {
                key = self.keys.recv() => {
                    let Some(key) = key else { break };
                    self.coalesce(key)
                }
                _ = ticker.tick() => Self::poll(&store).await,
            };

            for action in actions {
                match store.send(action).await {
                    Ok(_) => {}
                    Err(StoreError::ShutdownInProgress) => {
                        tracing::debug!("Store shutting down, polling worker stops");
                        return;
                    }
                    Err(error) => tracing::warn!(%error, "Failed to send fetch"),
                }
            }
        }
    }

    /// Merge `first` with every key already queued, one fetch per distinct key
    fn coalesce(&mut self, first: QueryKey) -> Vec<SyncAction> {
        let mut keys = BTreeSet::from([first]);
        while let Ok(key) = self.keys.try_recv() {
            keys.insert(key);
        }
        keys.iter().map(SyncAction::refetch).collect()
    }

    /// The workshop list plus the attendees of every known workshop
    async fn poll(store: &SyncStore) -> Vec<SyncAction> {
        let workshops: Vec<WorkshopId> = store
            .state(|state| state.entities.workshops().map(|w| w.id.clone()).collect())
            .await;
        tracing::debug!(workshops = workshops.len(), "Polling");

        std::iter::once(SyncAction::FetchWorkshops)
            .chain(workshops.into_iter().map(SyncAction::FetchAttendees))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code: channels are open
mod tests {
    use super::*;
    use workshop_sync_core::model::AttendeeId;

    #[test]
    fn invalidations_are_coalesced_into_distinct_fetches() {
        let (bridge, mut worker) = PollingBridge::new(Duration::from_secs(30));

        bridge.invalidate(&QueryKey::WorkshopList);
        bridge.invalidate(&QueryKey::AttendeeDetail(AttendeeId::new("a1")));
        bridge.invalidate(&QueryKey::WorkshopList);

        let first = worker.keys.try_recv().unwrap();
        let actions = worker.coalesce(first);

        assert_eq!(
            actions,
            vec![
                SyncAction::FetchWorkshops,
                SyncAction::FetchAttendee(AttendeeId::new("a1")),
            ]
        );
    }

    #[test]
    fn invalidating_after_the_worker_is_gone_is_harmless() {
        let (bridge, worker) = PollingBridge::new(Duration::from_secs(30));
        drop(worker);
        bridge.invalidate(&QueryKey::WorkshopList);
    }
}
