//! Workshop state derived from the states of its attendees.
//!
//! Used wherever the server-reported workshop status is stale or ambiguous.
//! The rule order is policy: the first matching rule wins.

use crate::model::{AttendeeStatus, WorkshopStatus};

/// Derive a workshop's displayed status from its attendees' statuses.
///
/// 1. no attendees → `planning`
/// 2. any `deploying` → `deploying`
/// 3. all `active` → `active`
/// 4. any `failed` → `failed`
/// 5. any `deleting` → `deleting`
/// 6. all `deleted` → `completed`
/// 7. anything else → `planning`
///
/// Total over every input; runs on each render so it must never panic.
#[must_use]
pub fn calculate_workshop_state(attendees: &[AttendeeStatus]) -> WorkshopStatus {
    let any = |wanted: AttendeeStatus| attendees.iter().any(|s| *s == wanted);
    let all = |wanted: AttendeeStatus| attendees.iter().all(|s| *s == wanted);

    if attendees.is_empty() {
        WorkshopStatus::Planning
    } else if any(AttendeeStatus::Deploying) {
        WorkshopStatus::Deploying
    } else if all(AttendeeStatus::Active) {
        WorkshopStatus::Active
    } else if any(AttendeeStatus::Failed) {
        WorkshopStatus::Failed
    } else if any(AttendeeStatus::Deleting) {
        WorkshopStatus::Deleting
    } else if all(AttendeeStatus::Deleted) {
        WorkshopStatus::Completed
    } else {
        // Mixed states such as planning + active. Conservative by choice,
        // even though it can under-report a workshop that is far along.
        WorkshopStatus::Planning
    }
}
