//! Legal lifecycle transitions for workshops and attendees.
//!
//! The graphs are fixed tables, not computed. Deployment never jumps from
//! `planning` straight to `active`: the in-progress states carry provisioning
//! side effects that must be observed. `failed` recovers through a retry
//! (`failed → deploying`) or is abandoned (`failed → deleting`).

use crate::error::SyncError;
use crate::model::{AttendeeStatus, EntityKind, EntityStatus, WorkshopStatus};

/// A status type with a fixed table of legal successors.
pub trait Lifecycle: Copy + PartialEq + std::fmt::Display + 'static {
    /// Kind of entity the lifecycle belongs to
    const KIND: EntityKind;

    /// Statuses reachable in one step
    fn allowed_targets(self) -> &'static [Self];

    /// Whether `self → to` is in the table
    fn can_transition_to(self, to: Self) -> bool {
        self.allowed_targets().contains(&to)
    }

    /// Whether no transition leaves this status
    fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }
}

impl Lifecycle for WorkshopStatus {
    const KIND: EntityKind = EntityKind::Workshop;

    fn allowed_targets(self) -> &'static [Self] {
        use WorkshopStatus::{Active, Completed, Deleting, Deploying, Failed, Planning};
        match self {
            Planning => &[Deploying, Deleting],
            Deploying => &[Active, Failed, Planning],
            Active => &[Deleting, Completed, Failed],
            Failed => &[Deploying, Deleting],
            Deleting => &[Completed, Failed],
            Completed => &[Deleting],
        }
    }
}

impl Lifecycle for AttendeeStatus {
    const KIND: EntityKind = EntityKind::Attendee;

    fn allowed_targets(self) -> &'static [Self] {
        use AttendeeStatus::{Active, Deleted, Deleting, Deploying, Failed, Planning};
        match self {
            Planning => &[Deploying],
            Deploying => &[Active, Failed],
            Active => &[Deleting, Failed],
            Failed => &[Deploying, Deleting],
            Deleting => &[Deleted, Failed],
            Deleted => &[],
        }
    }
}

/// Validate a single transition.
///
/// # Errors
///
/// Returns [`SyncError::InvalidTransition`] naming the current and attempted
/// status when the table does not allow `from → to`.
pub fn validate<S: Lifecycle>(from: S, to: S) -> Result<(), SyncError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(SyncError::InvalidTransition {
            kind: S::KIND,
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Validate a transition between kind-tagged statuses.
///
/// # Errors
///
/// Returns [`SyncError::InvalidTransition`] when the table forbids the
/// transition or when the two statuses belong to different kinds.
pub fn validate_status(from: EntityStatus, to: EntityStatus) -> Result<(), SyncError> {
    match (from, to) {
        (EntityStatus::Workshop(from), EntityStatus::Workshop(to)) => validate(from, to),
        (EntityStatus::Attendee(from), EntityStatus::Attendee(to)) => validate(from, to),
        (from, to) => Err(SyncError::InvalidTransition {
            kind: from.kind(),
            from: from.to_string(),
            to: format!("{} {to}", to.kind()),
        }),
    }
}
