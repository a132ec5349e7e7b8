//! Registry of named timers.
//!
//! One slot per [`TimerId`]. Arming a slot aborts whatever was armed there
//! before; cancelling an empty slot does nothing.

use std::collections::HashMap;
use tokio::task::AbortHandle;
use workshop_sync_core::effect::TimerId;

#[derive(Debug)]
struct Armed {
    seq: u64,
    handle: AbortHandle,
}

/// Live timer tasks keyed by id.
#[derive(Debug, Default)]
pub(crate) struct TimerRegistry {
    next_seq: u64,
    armed: HashMap<TimerId, Armed>,
}

impl TimerRegistry {
    /// Sequence number for the next armed task
    pub(crate) fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Put a task in the slot, aborting the previous occupant
    pub(crate) fn arm(&mut self, id: TimerId, seq: u64, handle: AbortHandle) {
        if let Some(previous) = self.armed.insert(id, Armed { seq, handle }) {
            previous.handle.abort();
            tracing::trace!(?id, "Replaced pending timer");
        }
    }

    /// Abort and clear the slot; returns whether anything was armed
    pub(crate) fn cancel(&mut self, id: TimerId) -> bool {
        self.armed.remove(&id).map(|armed| armed.handle.abort()).is_some()
    }

    /// Clear the slot without aborting, if it still holds task `seq`.
    ///
    /// Called by a one-shot timer as it fires.
    pub(crate) fn disarm(&mut self, id: TimerId, seq: u64) {
        if self.armed.get(&id).is_some_and(|armed| armed.seq == seq) {
            self.armed.remove(&id);
        }
    }

    /// Abort every armed timer
    pub(crate) fn cancel_all(&mut self) {
        for (_, armed) in self.armed.drain() {
            armed.handle.abort();
        }
    }

    /// Ids of the armed slots
    pub(crate) fn armed(&self) -> Vec<TimerId> {
        self.armed.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;

    #[tokio::test]
    async fn arming_a_slot_aborts_the_previous_task() {
        let mut registry = TimerRegistry::default();
        let first = tokio::spawn(pending::<()>());
        let second = tokio::spawn(pending::<()>());

        let seq = registry.next_seq();
        registry.arm(TimerId::Reconnect, seq, first.abort_handle());
        let seq = registry.next_seq();
        registry.arm(TimerId::Reconnect, seq, second.abort_handle());

        assert!(first.await.is_err_and(|e| e.is_cancelled()));
        assert_eq!(registry.armed(), vec![TimerId::Reconnect]);
        second.abort();
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let mut registry = TimerRegistry::default();
        let task = tokio::spawn(pending::<()>());
        let seq = registry.next_seq();
        registry.arm(TimerId::LivenessProbe, seq, task.abort_handle());

        assert!(registry.cancel(TimerId::LivenessProbe));
        assert!(!registry.cancel(TimerId::LivenessProbe));
        assert!(!registry.cancel(TimerId::Reconnect));
        assert!(task.await.is_err_and(|e| e.is_cancelled()));
    }

    #[tokio::test]
    async fn stale_disarm_leaves_the_newer_timer_alone() {
        let mut registry = TimerRegistry::default();
        let old = registry.next_seq();
        let task = tokio::spawn(pending::<()>());
        let new = registry.next_seq();
        registry.arm(TimerId::Reconnect, new, task.abort_handle());

        registry.disarm(TimerId::Reconnect, old);
        assert_eq!(registry.armed(), vec![TimerId::Reconnect]);

        registry.disarm(TimerId::Reconnect, new);
        assert!(registry.armed().is_empty());
        task.abort();
    }
}
