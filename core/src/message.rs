//! Push channel messages and cache query keys.
//!
//! Incoming envelopes are decoded into [`PushMessage`], a tagged enum keyed on
//! the `type` field, so every kind is matched explicitly. Unknown types decode
//! to [`PushMessage::Unknown`] and are ignored.

use crate::error::SyncError;
use crate::model::{AttendeeId, EntityKind, EntityRef, EntityStatus, WorkshopId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// WebSocket close codes the channel distinguishes.
pub mod close_code {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
    /// Endpoint going away
    pub const GOING_AWAY: u16 = 1001;
    /// Close frame without a status code
    pub const NO_STATUS: u16 = 1005;
    /// Connection dropped without a close frame
    pub const ABNORMAL: u16 = 1006;
    /// Client closed the channel on purpose
    pub const INTENTIONAL: u16 = 4000;

    /// Whether a closure should be left alone rather than reconnected.
    ///
    /// `None` means the connection ended without any close frame.
    #[must_use]
    pub const fn is_expected(code: Option<u16>) -> bool {
        matches!(code, Some(NORMAL | GOING_AWAY | NO_STATUS | INTENTIONAL))
    }
}

/// Envelope received on the push channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    /// An entity changed on the server
    StatusUpdate(StatusUpdateEnvelope),
    /// Greeting sent by the server after the socket opens
    Connection {
        /// Free-form greeting
        #[serde(default)]
        message: Option<String>,
        /// Server time
        #[serde(default)]
        timestamp: Option<String>,
    },
    /// Reply to a liveness probe
    Pong {
        /// Server time
        #[serde(default)]
        timestamp: Option<String>,
    },
    /// Any other `type`
    #[serde(other)]
    Unknown,
}

impl PushMessage {
    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MalformedMessage`] if the text is not a JSON
    /// envelope with a string `type`.
    pub fn parse(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text).map_err(|e| SyncError::MalformedMessage(e.to_string()))
    }
}

/// Raw `status_update` payload; every field may be missing on the wire.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct StatusUpdateEnvelope {
    /// Kind of the changed entity
    #[serde(default)]
    pub entity_type: Option<EntityKind>,
    /// Id of the changed entity
    #[serde(default)]
    pub entity_id: Option<String>,
    /// New status, as a wire string
    #[serde(default)]
    pub status: Option<String>,
    /// Owning workshop, for attendees
    #[serde(default)]
    pub workshop_id: Option<WorkshopId>,
    /// Extra server-provided context
    #[serde(default)]
    pub details: Option<serde_json::Value>,
    /// Server time
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// A `status_update` with every required field present and parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    /// Changed entity
    pub entity: EntityRef,
    /// Its new authoritative status
    pub status: EntityStatus,
    /// Owning workshop, when the server sent it
    pub workshop_id: Option<WorkshopId>,
    /// Extra server-provided context
    pub details: Option<serde_json::Value>,
}

impl StatusUpdateEnvelope {
    /// Check required fields and parse the status for the entity kind.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MalformedMessage`] naming the first missing or
    /// invalid field.
    pub fn into_update(self) -> Result<StatusUpdate, SyncError> {
        let kind = self
            .entity_type
            .ok_or_else(|| SyncError::MalformedMessage("missing entity_type".to_string()))?;
        let id = self
            .entity_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SyncError::MalformedMessage("missing entity_id".to_string()))?;
        let raw_status = self
            .status
            .ok_or_else(|| SyncError::MalformedMessage("missing status".to_string()))?;
        let status = EntityStatus::parse(kind, &raw_status)
            .map_err(|e| SyncError::MalformedMessage(e.to_string()))?;

        let entity = match kind {
            EntityKind::Workshop => EntityRef::Workshop(WorkshopId::new(id)),
            EntityKind::Attendee => EntityRef::Attendee(AttendeeId::new(id)),
        };

        Ok(StatusUpdate {
            entity,
            status,
            workshop_id: self.workshop_id,
            details: self.details,
        })
    }
}

/// Messages the client sends on the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Liveness probe
    Ping,
}

impl OutboundMessage {
    /// Serialize to a text frame.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; unit variants never produce one in practice.
    pub fn to_text(self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self)
    }
}

/// Identifies one cached query of the polling layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryKey {
    /// All workshops
    WorkshopList,
    /// One workshop
    WorkshopDetail(WorkshopId),
    /// Attendees of one workshop
    AttendeeList(WorkshopId),
    /// One attendee
    AttendeeDetail(AttendeeId),
}

impl QueryKey {
    /// Path-like key segments, e.g. `["attendees", "w1"]`
    #[must_use]
    pub fn segments(&self) -> Vec<&str> {
        match self {
            Self::WorkshopList => vec!["workshops"],
            Self::WorkshopDetail(id) => vec!["workshop", id.as_str()],
            Self::AttendeeList(workshop_id) => vec!["attendees", workshop_id.as_str()],
            Self::AttendeeDetail(id) => vec!["attendee", id.as_str()],
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments().join("/"))
    }
}

/// Queries made stale by a change to a workshop.
#[must_use]
pub fn workshop_scopes(id: &WorkshopId) -> [QueryKey; 3] {
    [
        QueryKey::WorkshopDetail(id.clone()),
        QueryKey::AttendeeList(id.clone()),
        QueryKey::WorkshopList,
    ]
}

/// Queries made stale by a change to an attendee of `workshop_id`.
#[must_use]
pub fn attendee_scopes(id: &AttendeeId, workshop_id: &WorkshopId) -> [QueryKey; 4] {
    [
        QueryKey::AttendeeDetail(id.clone()),
        QueryKey::AttendeeList(workshop_id.clone()),
        QueryKey::WorkshopDetail(workshop_id.clone()),
        QueryKey::WorkshopList,
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code: fixtures are well-formed
mod tests {
    use super::*;
    use crate::model::AttendeeStatus;

    #[test]
    fn decodes_attendee_status_update() {
        let text = r#"{
            "type": "status_update",
            "entity_type": "attendee",
            "entity_id": "a1",
            "status": "active",
            "workshop_id": "w1",
            "timestamp": "2025-01-01T00:00:00Z"
        }"#;

        let PushMessage::StatusUpdate(envelope) = PushMessage::parse(text).unwrap() else {
            unreachable!("expected a status update");
        };
        let update = envelope.into_update().unwrap();

        assert_eq!(update.entity, EntityRef::Attendee(AttendeeId::new("a1")));
        assert_eq!(update.status, EntityStatus::Attendee(AttendeeStatus::Active));
        assert_eq!(update.workshop_id, Some(WorkshopId::new("w1")));
    }

    #[test]
    fn unknown_types_are_ignored_not_rejected() {
        let message = PushMessage::parse(r#"{"type":"heartbeat","timestamp":"now"}"#).unwrap();
        assert_eq!(message, PushMessage::Unknown);
    }

    #[test]
    fn incomplete_status_update_is_malformed() {
        let message =
            PushMessage::parse(r#"{"type":"status_update","entity_type":"workshop"}"#).unwrap();
        let PushMessage::StatusUpdate(envelope) = message else {
            unreachable!("expected a status update");
        };
        assert_eq!(
            envelope.into_update(),
            Err(SyncError::MalformedMessage("missing entity_id".to_string()))
        );
    }

    #[test]
    fn status_of_wrong_kind_is_malformed() {
        let envelope = StatusUpdateEnvelope {
            entity_type: Some(EntityKind::Workshop),
            entity_id: Some("w1".to_string()),
            status: Some("deleted".to_string()),
            ..StatusUpdateEnvelope::default()
        };
        assert!(matches!(
            envelope.into_update(),
            Err(SyncError::MalformedMessage(_))
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            PushMessage::parse("not json"),
            Err(SyncError::MalformedMessage(_))
        ));
        assert!(matches!(
            PushMessage::parse(r#"{"entity_id":"w1"}"#),
            Err(SyncError::MalformedMessage(_))
        ));
    }

    #[test]
    fn ping_serializes_as_typed_envelope() {
        assert_eq!(OutboundMessage::Ping.to_text().unwrap(), r#"{"type":"ping"}"#);
    }

    #[test]
    fn expected_close_codes() {
        for code in [1000, 1001, 1005, 4000] {
            assert!(close_code::is_expected(Some(code)));
        }
        assert!(!close_code::is_expected(Some(1006)));
        assert!(!close_code::is_expected(Some(1011)));
        assert!(!close_code::is_expected(None));
    }

    #[test]
    fn attendee_change_touches_four_queries() {
        let keys = attendee_scopes(&AttendeeId::new("x"), &WorkshopId::new("w"));
        let rendered: Vec<String> = keys.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["attendee/x", "attendees/w", "workshop/w", "workshops"]
        );
    }
}
