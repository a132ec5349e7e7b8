//! Client-side view of workshops and attendees.
//!
//! [`SyncState`] holds the authoritative [`EntityStore`] and the
//! [`OptimisticOverlay`] side by side. They are never merged: the
//! `displayed_*` methods read the prediction first and fall back to the
//! stored value.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use workshop_sync_core::SyncError;
use workshop_sync_core::effective::calculate_workshop_state;
use workshop_sync_core::entity_store::{EntityStore, StoreChange, StoreCommand};
use workshop_sync_core::model::{
    AttendeeId, AttendeeStatus, EntityRef, EntityStatus, WorkshopId, WorkshopStatus,
};
use workshop_sync_core::overlay::{OptimisticAction, OptimisticOverlay};

/// An error kept until a successful transition or an explicit clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedError {
    /// What went wrong
    pub error: SyncError,
    /// When it was recorded
    pub recorded_at: DateTime<Utc>,
}

/// A mutation request waiting for the server's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    /// Identifies the request; a newer request on the same entity supersedes it
    pub request_id: u64,
    /// User action that started it
    pub action: OptimisticAction,
    /// Authoritative status when the request was sent
    pub based_on: EntityStatus,
    /// Predicted status the request leads to
    pub target: EntityStatus,
    /// Attendee predictions cascaded from a workshop action
    pub cascaded: Vec<CascadedPrediction>,
}

/// An attendee prediction made on behalf of its workshop's action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadedPrediction {
    /// The attendee
    pub entity: EntityRef,
    /// Its authoritative status at the time
    pub based_on: EntityStatus,
    /// The status predicted for it
    pub predicted: EntityStatus,
}

/// Lifecycle of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPhase {
    /// Never opened, or disconnected on purpose
    #[default]
    Idle,
    /// A connection attempt is in flight
    Connecting,
    /// Connected; liveness probes are running
    Open,
    /// Waiting for the backoff timer before the next attempt
    Reconnecting,
    /// Closed by the server with an expected code, or given up
    Closed,
}

/// Push channel bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    /// Current phase
    pub phase: ChannelPhase,
    /// Reconnect attempts made since the last successful open
    pub attempts: u32,
    /// Identifies the current connection; events tagged with another are stale
    pub generation: u64,
    /// Set when reconnecting gave up; cleared by the next successful open
    pub connection_error: Option<RecordedError>,
}

/// Counters shown on a workshop detail view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkshopSummary {
    /// Displayed workshop status
    pub status: WorkshopStatus,
    /// Attendees indexed under the workshop
    pub attendee_count: u32,
    /// Of those, how many are displayed as active
    pub active_attendees: u32,
}

/// Everything the reducer owns.
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    /// Authoritative entities
    pub entities: EntityStore,
    /// Predicted statuses of in-flight actions
    pub overlay: OptimisticOverlay,
    /// Per-entity errors
    pub errors: HashMap<EntityRef, RecordedError>,
    /// Mutations awaiting the server, one per entity
    pub pending: HashMap<EntityRef, PendingMutation>,
    /// Cascaded predictions whose workshop mutation was confirmed; the next
    /// authoritative write to each clears it
    pub settling: HashSet<EntityRef>,
    /// Push channel bookkeeping
    pub channel: ChannelState,
    next_request_id: u64,
}

impl SyncState {
    /// Create an empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write authoritative data and let the overlay catch up.
    ///
    /// Every written status is offered to [`OptimisticOverlay::reconcile`],
    /// except for settling entities whose prediction is dropped outright.
    /// Evicted entities lose their prediction, error and pending request.
    pub fn apply(&mut self, command: StoreCommand) -> StoreChange {
        let change = self.entities.apply(command);

        for (entity, status) in &change.written {
            if self.settling.remove(entity) {
                self.overlay.clear(entity);
            } else {
                self.overlay.reconcile(entity, *status);
            }
        }
        for entity in &change.evicted {
            self.settling.remove(entity);
            self.overlay.clear(entity);
            self.errors.remove(entity);
            self.pending.remove(entity);
        }

        change
    }

    /// Record an error for `entity`, replacing any previous one
    pub fn record_error(&mut self, entity: EntityRef, error: SyncError, at: DateTime<Utc>) {
        tracing::warn!(%entity, %error, "Error recorded");
        self.errors.insert(
            entity,
            RecordedError {
                error,
                recorded_at: at,
            },
        );
    }

    /// Error recorded for `entity`, if any
    #[must_use]
    pub fn error(&self, entity: &EntityRef) -> Option<&RecordedError> {
        self.errors.get(entity)
    }

    /// Allocate the id of a new mutation request
    pub const fn next_request_id(&mut self) -> u64 {
        self.next_request_id += 1;
        self.next_request_id
    }

    /// Attendee status as shown: prediction, else stored status
    #[must_use]
    pub fn displayed_attendee_status(&self, id: &AttendeeId) -> Option<AttendeeStatus> {
        let entity = EntityRef::Attendee(id.clone());
        self.overlay
            .effective_state(&entity, self.entities.status(&entity))
            .and_then(EntityStatus::as_attendee)
    }

    /// Workshop status as shown.
    ///
    /// A prediction on the workshop wins; otherwise, when attendees are
    /// loaded, the status derived from their displayed statuses; otherwise
    /// the stored status.
    #[must_use]
    pub fn displayed_workshop_status(&self, id: &WorkshopId) -> Option<WorkshopStatus> {
        let entity = EntityRef::Workshop(id.clone());
        if let Some(predicted) = self.overlay.predicted(&entity) {
            return predicted.as_workshop();
        }

        let stored = self.entities.workshop(id)?.status;
        let attendees: Vec<AttendeeStatus> = self
            .entities
            .attendee_ids_of(id)
            .iter()
            .filter_map(|attendee| self.displayed_attendee_status(attendee))
            .collect();

        if attendees.is_empty() {
            Some(stored)
        } else {
            Some(calculate_workshop_state(&attendees))
        }
    }

    /// Displayed status and counters of a loaded workshop
    #[must_use]
    pub fn workshop_summary(&self, id: &WorkshopId) -> Option<WorkshopSummary> {
        let status = self.displayed_workshop_status(id)?;
        let ids = self.entities.attendee_ids_of(id);
        let active = ids
            .iter()
            .filter(|attendee| {
                self.displayed_attendee_status(attendee) == Some(AttendeeStatus::Active)
            })
            .count();

        Some(WorkshopSummary {
            status,
            attendee_count: u32::try_from(ids.len()).unwrap_or(u32::MAX),
            active_attendees: u32::try_from(active).unwrap_or(u32::MAX),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code: fixtures are well-formed
mod tests {
    use super::*;
    use workshop_sync_core::model::{Attendee, Workshop};
    use workshop_sync_testing::fixtures;

    fn loaded(workshop: Workshop, attendees: Vec<Attendee>) -> SyncState {
        let mut state = SyncState::new();
        let workshop_id = workshop.id.clone();
        state.apply(StoreCommand::PutWorkshop(workshop));
        state.apply(StoreCommand::PutAttendees {
            workshop_id,
            attendees,
        });
        state
    }

    #[test]
    fn workshop_without_attendees_shows_its_stored_status() {
        let state = loaded(fixtures::workshop("w1", WorkshopStatus::Active), vec![]);
        assert_eq!(
            state.displayed_workshop_status(&WorkshopId::new("w1")),
            Some(WorkshopStatus::Active)
        );
    }

    #[test]
    fn workshop_status_is_derived_from_displayed_attendees() {
        let mut state = loaded(
            fixtures::workshop("w1", WorkshopStatus::Planning),
            vec![
                fixtures::attendee("a1", "w1", AttendeeStatus::Active),
                fixtures::attendee("a2", "w1", AttendeeStatus::Active),
            ],
        );
        assert_eq!(
            state.displayed_workshop_status(&WorkshopId::new("w1")),
            Some(WorkshopStatus::Active)
        );

        state.overlay.apply(
            EntityRef::Attendee(AttendeeId::new("a2")),
            OptimisticAction::Cleanup,
            EntityStatus::Attendee(AttendeeStatus::Active),
        );

        assert_eq!(
            state.displayed_workshop_status(&WorkshopId::new("w1")),
            Some(WorkshopStatus::Deleting)
        );
    }

    #[test]
    fn workshop_prediction_wins_over_derivation() {
        let mut state = loaded(
            fixtures::workshop("w1", WorkshopStatus::Planning),
            vec![fixtures::attendee("a1", "w1", AttendeeStatus::Planning)],
        );
        state.overlay.apply(
            EntityRef::Workshop(WorkshopId::new("w1")),
            OptimisticAction::Deploy,
            EntityStatus::Workshop(WorkshopStatus::Planning),
        );

        assert_eq!(
            state.displayed_workshop_status(&WorkshopId::new("w1")),
            Some(WorkshopStatus::Deploying)
        );
    }

    #[test]
    fn authoritative_write_clears_a_caught_up_prediction() {
        let mut state = loaded(
            fixtures::workshop("w1", WorkshopStatus::Planning),
            vec![fixtures::attendee("a1", "w1", AttendeeStatus::Planning)],
        );
        let a1 = EntityRef::Attendee(AttendeeId::new("a1"));
        state.overlay.apply(
            a1.clone(),
            OptimisticAction::Deploy,
            EntityStatus::Attendee(AttendeeStatus::Planning),
        );

        state.apply(StoreCommand::SetStatus {
            entity: a1.clone(),
            status: EntityStatus::Attendee(AttendeeStatus::Deploying),
        });

        assert!(state.overlay.predicted(&a1).is_none());
    }

    #[test]
    fn settling_prediction_is_dropped_by_a_stale_write() {
        let mut state = loaded(
            fixtures::workshop("w1", WorkshopStatus::Planning),
            vec![fixtures::attendee("a1", "w1", AttendeeStatus::Planning)],
        );
        let a1 = EntityRef::Attendee(AttendeeId::new("a1"));
        state.overlay.apply(
            a1.clone(),
            OptimisticAction::Deploy,
            EntityStatus::Attendee(AttendeeStatus::Planning),
        );
        state.settling.insert(a1.clone());

        state.apply(StoreCommand::PutAttendee(fixtures::attendee(
            "a1",
            "w1",
            AttendeeStatus::Planning,
        )));

        assert!(state.overlay.predicted(&a1).is_none());
        assert!(state.settling.is_empty());
        assert_eq!(
            state.displayed_attendee_status(&AttendeeId::new("a1")),
            Some(AttendeeStatus::Planning)
        );
    }

    #[test]
    fn eviction_drops_prediction_error_and_pending_request() {
        let mut state = loaded(
            fixtures::workshop("w1", WorkshopStatus::Active),
            vec![fixtures::attendee("a1", "w1", AttendeeStatus::Active)],
        );
        let a1 = EntityRef::Attendee(AttendeeId::new("a1"));
        state.overlay.apply(
            a1.clone(),
            OptimisticAction::DeleteEntity,
            EntityStatus::Attendee(AttendeeStatus::Active),
        );
        state.record_error(
            a1.clone(),
            SyncError::ConditionNotMet("stale".to_string()),
            Utc::now(),
        );

        state.apply(StoreCommand::PutAttendees {
            workshop_id: WorkshopId::new("w1"),
            attendees: vec![],
        });

        assert!(state.overlay.is_empty());
        assert!(state.error(&a1).is_none());
    }

    #[test]
    fn summary_counts_displayed_active_attendees() {
        let state = loaded(
            fixtures::workshop("w1", WorkshopStatus::Deploying),
            vec![
                fixtures::attendee("a1", "w1", AttendeeStatus::Active),
                fixtures::attendee("a2", "w1", AttendeeStatus::Deploying),
            ],
        );

        let summary = state.workshop_summary(&WorkshopId::new("w1")).unwrap();

        assert_eq!(summary.status, WorkshopStatus::Deploying);
        assert_eq!(summary.attendee_count, 2);
        assert_eq!(summary.active_attendees, 1);
    }

    #[test]
    fn request_ids_increase() {
        let mut state = SyncState::new();
        let first = state.next_request_id();
        assert!(state.next_request_id() > first);
    }

    proptest::proptest! {
        #[test]
        fn displayed_workshop_status_is_never_stored_separately(
            statuses in workshop_sync_testing::properties::attendee_statuses(6),
        ) {
            let attendees: Vec<Attendee> = statuses
                .iter()
                .enumerate()
                .map(|(i, status)| fixtures::attendee(&format!("a{i}"), "w1", *status))
                .collect();
            let state = loaded(fixtures::workshop("w1", WorkshopStatus::Failed), attendees);

            let displayed = state.displayed_workshop_status(&WorkshopId::new("w1"));
            let expected = if statuses.is_empty() {
                WorkshopStatus::Failed
            } else {
                calculate_workshop_state(&statuses)
            };
            proptest::prop_assert_eq!(displayed, Some(expected));
        }
    }
}
