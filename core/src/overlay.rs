//! Optimistic overlay: predicted statuses shown while a request is in flight.
//!
//! The overlay is a separate map from the entity store and is never merged
//! into it. What a view shows is `prediction orElse authoritative`, so rolling
//! back is deleting one key and authoritative data is always recoverable.

use crate::model::{AttendeeStatus, EntityRef, EntityStatus, WorkshopStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// User-initiated actions that have a predictable outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptimisticAction {
    /// Start provisioning
    Deploy,
    /// Tear down provisioned resources
    Cleanup,
    /// Remove the entity
    DeleteEntity,
    /// Provision again after a failure
    Retry,
}

impl fmt::Display for OptimisticAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deploy => f.write_str("deploy"),
            Self::Cleanup => f.write_str("cleanup"),
            Self::DeleteEntity => f.write_str("delete"),
            Self::Retry => f.write_str("retry"),
        }
    }
}

/// Predict the status an action leads to from an authoritative status.
///
/// Returns `None` when the action is not meaningful from `current`; the
/// display is then left unchanged. A `deleted` attendee accepts no
/// prediction, and `DeleteEntity` only predicts for attendees since
/// workshops have no `deleted` status.
#[must_use]
pub fn predict(action: OptimisticAction, current: EntityStatus) -> Option<EntityStatus> {
    use OptimisticAction::{Cleanup, DeleteEntity, Deploy, Retry};

    match current {
        EntityStatus::Workshop(status) => {
            let predicted = match (action, status) {
                (Deploy, WorkshopStatus::Planning) | (Retry, WorkshopStatus::Failed) => {
                    WorkshopStatus::Deploying
                }
                (Cleanup, WorkshopStatus::Active | WorkshopStatus::Failed) => {
                    WorkshopStatus::Deleting
                }
                _ => return None,
            };
            Some(EntityStatus::Workshop(predicted))
        }
        EntityStatus::Attendee(AttendeeStatus::Deleted) => None,
        EntityStatus::Attendee(status) => {
            let predicted = match (action, status) {
                (Deploy, AttendeeStatus::Planning) | (Retry, AttendeeStatus::Failed) => {
                    AttendeeStatus::Deploying
                }
                (Cleanup, AttendeeStatus::Active | AttendeeStatus::Failed) => {
                    AttendeeStatus::Deleting
                }
                (DeleteEntity, _) => AttendeeStatus::Deleted,
                _ => return None,
            };
            Some(EntityStatus::Attendee(predicted))
        }
    }
}

/// One prediction and the authoritative status it was made from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimisticEntry {
    /// Status shown while the request is in flight
    pub predicted: EntityStatus,
    /// Authoritative status at the time of the prediction
    pub based_on: EntityStatus,
}

/// Per-entity map of predicted statuses.
///
/// At most one entry per entity: a newer prediction replaces the older one.
#[derive(Debug, Clone, Default)]
pub struct OptimisticOverlay {
    entries: HashMap<EntityRef, OptimisticEntry>,
}

impl OptimisticOverlay {
    /// Create an empty overlay
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the prediction for `action`, replacing any previous entry.
    ///
    /// Returns the predicted status, or `None` (leaving the overlay untouched)
    /// when the action is not meaningful from `authoritative`.
    pub fn apply(
        &mut self,
        entity: EntityRef,
        action: OptimisticAction,
        authoritative: EntityStatus,
    ) -> Option<EntityStatus> {
        let predicted = predict(action, authoritative)?;
        tracing::debug!(%entity, %action, %predicted, "Optimistic prediction applied");
        self.entries.insert(
            entity,
            OptimisticEntry {
                predicted,
                based_on: authoritative,
            },
        );
        Some(predicted)
    }

    /// Drop the entry for `entity`, returning it if there was one
    pub fn clear(&mut self, entity: &EntityRef) -> Option<OptimisticEntry> {
        self.entries.remove(entity)
    }

    /// Predicted status for `entity`, if any
    #[must_use]
    pub fn predicted(&self, entity: &EntityRef) -> Option<EntityStatus> {
        self.entries.get(entity).map(|entry| entry.predicted)
    }

    /// Full entry for `entity`, if any
    #[must_use]
    pub fn entry(&self, entity: &EntityRef) -> Option<&OptimisticEntry> {
        self.entries.get(entity)
    }

    /// The prediction if present, otherwise the authoritative status
    #[must_use]
    pub fn effective_state(
        &self,
        entity: &EntityRef,
        authoritative: Option<EntityStatus>,
    ) -> Option<EntityStatus> {
        self.predicted(entity).or(authoritative)
    }

    /// Clear the entry once authoritative data has caught up with it.
    ///
    /// Caught up means the new authoritative status equals the prediction or
    /// has moved away from the status the prediction was based on. Returns
    /// `true` if an entry was cleared.
    pub fn reconcile(&mut self, entity: &EntityRef, authoritative: EntityStatus) -> bool {
        let caught_up = self.entries.get(entity).is_some_and(|entry| {
            entry.predicted == authoritative || entry.based_on != authoritative
        });
        if caught_up {
            self.entries.remove(entity);
            tracing::debug!(%entity, %authoritative, "Optimistic prediction superseded");
        }
        caught_up
    }

    /// Number of live predictions
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no prediction is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttendeeId, WorkshopId};

    fn workshop(id: &str) -> EntityRef {
        EntityRef::Workshop(WorkshopId::new(id))
    }

    fn attendee(id: &str) -> EntityRef {
        EntityRef::Attendee(AttendeeId::new(id))
    }

    const W_PLANNING: EntityStatus = EntityStatus::Workshop(WorkshopStatus::Planning);
    const W_DEPLOYING: EntityStatus = EntityStatus::Workshop(WorkshopStatus::Deploying);

    #[test]
    fn deploy_on_planning_predicts_deploying_and_clear_reverts() {
        let mut overlay = OptimisticOverlay::new();
        let predicted = overlay.apply(workshop("w1"), OptimisticAction::Deploy, W_PLANNING);

        assert_eq!(predicted, Some(W_DEPLOYING));
        assert_eq!(
            overlay.effective_state(&workshop("w1"), Some(W_PLANNING)),
            Some(W_DEPLOYING)
        );

        overlay.clear(&workshop("w1"));
        assert_eq!(
            overlay.effective_state(&workshop("w1"), Some(W_PLANNING)),
            Some(W_PLANNING)
        );
        assert!(overlay.is_empty());
    }

    #[test]
    fn prediction_table() {
        use OptimisticAction::*;
        let a = EntityStatus::Attendee;
        let w = EntityStatus::Workshop;

        assert_eq!(predict(Cleanup, w(WorkshopStatus::Active)), Some(w(WorkshopStatus::Deleting)));
        assert_eq!(predict(Cleanup, w(WorkshopStatus::Failed)), Some(w(WorkshopStatus::Deleting)));
        assert_eq!(predict(Retry, w(WorkshopStatus::Failed)), Some(w(WorkshopStatus::Deploying)));
        assert_eq!(predict(Deploy, w(WorkshopStatus::Active)), None);
        assert_eq!(predict(DeleteEntity, w(WorkshopStatus::Active)), None);

        assert_eq!(predict(DeleteEntity, a(AttendeeStatus::Planning)), Some(a(AttendeeStatus::Deleted)));
        assert_eq!(predict(Retry, a(AttendeeStatus::Active)), None);
        assert_eq!(predict(DeleteEntity, a(AttendeeStatus::Deleted)), None);
        assert_eq!(predict(Cleanup, a(AttendeeStatus::Planning)), None);
    }

    #[test]
    fn new_prediction_replaces_the_previous_one() {
        let mut overlay = OptimisticOverlay::new();
        let planning = EntityStatus::Attendee(AttendeeStatus::Planning);
        overlay.apply(attendee("a1"), OptimisticAction::Deploy, planning);
        overlay.apply(attendee("a1"), OptimisticAction::DeleteEntity, planning);

        assert_eq!(overlay.len(), 1);
        assert_eq!(
            overlay.predicted(&attendee("a1")),
            Some(EntityStatus::Attendee(AttendeeStatus::Deleted))
        );
    }

    #[test]
    fn meaningless_action_leaves_display_unchanged() {
        let mut overlay = OptimisticOverlay::new();
        let active = EntityStatus::Workshop(WorkshopStatus::Active);
        assert_eq!(overlay.apply(workshop("w1"), OptimisticAction::Deploy, active), None);
        assert!(overlay.is_empty());
    }

    #[test]
    fn reconcile_clears_on_catch_up_only() {
        let mut overlay = OptimisticOverlay::new();
        overlay.apply(workshop("w1"), OptimisticAction::Deploy, W_PLANNING);

        // Stale read of the status the prediction was made from
        assert!(!overlay.reconcile(&workshop("w1"), W_PLANNING));
        assert!(overlay.predicted(&workshop("w1")).is_some());

        assert!(overlay.reconcile(&workshop("w1"), W_DEPLOYING));
        assert!(overlay.is_empty());

        overlay.apply(workshop("w1"), OptimisticAction::Deploy, W_PLANNING);
        assert!(overlay.reconcile(
            &workshop("w1"),
            EntityStatus::Workshop(WorkshopStatus::Active)
        ));
    }
}
