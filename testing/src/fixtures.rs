//! Entity builders with fixed timestamps.

use crate::mocks::test_clock;
use workshop_sync_core::environment::Clock;
use workshop_sync_core::model::{
    Attendee, AttendeeId, AttendeeStatus, Workshop, WorkshopId, WorkshopStatus,
};

/// Workshop `id` in `status`, created at the test clock's time
#[must_use]
pub fn workshop(id: &str, status: WorkshopStatus) -> Workshop {
    let now = test_clock().now();
    Workshop {
        id: WorkshopId::new(id),
        name: format!("Workshop {id}"),
        description: None,
        start_date: now,
        end_date: now + chrono::Duration::hours(8),
        status,
        attendee_count: None,
        active_attendees: None,
        created_at: now,
    }
}

/// Attendee `id` of `workshop_id` in `status`
#[must_use]
pub fn attendee(id: &str, workshop_id: &str, status: AttendeeStatus) -> Attendee {
    Attendee {
        id: AttendeeId::new(id),
        workshop_id: WorkshopId::new(workshop_id),
        username: id.to_string(),
        email: format!("{id}@example.com"),
        status,
        ovh_project_id: None,
        deletion_scheduled_at: None,
        created_at: test_clock().now(),
    }
}

/// A `status_update` push frame
#[must_use]
pub fn status_update_frame(
    entity_type: &str,
    entity_id: &str,
    status: &str,
    workshop_id: Option<&str>,
) -> String {
    serde_json::json!({
        "type": "status_update",
        "entity_type": entity_type,
        "entity_id": entity_id,
        "status": status,
        "workshop_id": workshop_id,
        "timestamp": "2025-01-01T00:00:00Z",
    })
    .to_string()
}
