//! Workshops, attendees and their lifecycle statuses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a wire status string is not a known status for the kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} status: {value}")]
pub struct ParseStatusError {
    /// Entity kind the status was parsed for
    pub kind: EntityKind,
    /// The rejected input
    pub value: String,
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an id from any string-like value
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the id as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Server-assigned workshop identifier
    WorkshopId
);

string_id!(
    /// Server-assigned attendee identifier
    AttendeeId
);

/// The two entity kinds the client tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A workshop
    Workshop,
    /// An attendee of a workshop
    Attendee,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workshop => f.write_str("workshop"),
            Self::Attendee => f.write_str("attendee"),
        }
    }
}

/// Reference to a single entity of either kind.
///
/// Keys the optimistic overlay, the error map and the pending mutations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    /// A workshop
    Workshop(WorkshopId),
    /// An attendee
    Attendee(AttendeeId),
}

impl EntityRef {
    /// Kind of the referenced entity
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Workshop(_) => EntityKind::Workshop,
            Self::Attendee(_) => EntityKind::Attendee,
        }
    }

    /// Raw id string
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Workshop(id) => id.as_str(),
            Self::Attendee(id) => id.as_str(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

impl From<WorkshopId> for EntityRef {
    fn from(id: WorkshopId) -> Self {
        Self::Workshop(id)
    }
}

impl From<AttendeeId> for EntityRef {
    fn from(id: AttendeeId) -> Self {
        Self::Attendee(id)
    }
}

/// Lifecycle status of a workshop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkshopStatus {
    /// Created, nothing provisioned yet
    Planning,
    /// Attendee environments are being provisioned
    Deploying,
    /// Running
    Active,
    /// Provisioning or teardown failed
    Failed,
    /// Resources are being torn down
    Deleting,
    /// Finished and torn down
    Completed,
}

impl WorkshopStatus {
    /// Every workshop status, in lifecycle order
    pub const ALL: [Self; 6] = [
        Self::Planning,
        Self::Deploying,
        Self::Active,
        Self::Failed,
        Self::Deleting,
        Self::Completed,
    ];

    /// Wire representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Deploying => "deploying",
            Self::Active => "active",
            Self::Failed => "failed",
            Self::Deleting => "deleting",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for WorkshopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkshopStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError {
                kind: EntityKind::Workshop,
                value: s.to_string(),
            })
    }
}

/// Lifecycle status of an attendee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendeeStatus {
    /// Registered, no project yet
    Planning,
    /// Project is being provisioned
    Deploying,
    /// Project is live
    Active,
    /// Provisioning or teardown failed
    Failed,
    /// Project is being torn down
    Deleting,
    /// Torn down. Terminal.
    Deleted,
}

impl AttendeeStatus {
    /// Every attendee status, in lifecycle order
    pub const ALL: [Self; 6] = [
        Self::Planning,
        Self::Deploying,
        Self::Active,
        Self::Failed,
        Self::Deleting,
        Self::Deleted,
    ];

    /// Wire representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Deploying => "deploying",
            Self::Active => "active",
            Self::Failed => "failed",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for AttendeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendeeStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError {
                kind: EntityKind::Attendee,
                value: s.to_string(),
            })
    }
}

/// A status tagged with the kind of entity it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum EntityStatus {
    /// Workshop status
    Workshop(WorkshopStatus),
    /// Attendee status
    Attendee(AttendeeStatus),
}

impl EntityStatus {
    /// Parse a wire status for the given kind
    ///
    /// # Errors
    ///
    /// Returns [`ParseStatusError`] if `value` is not a status of `kind`.
    pub fn parse(kind: EntityKind, value: &str) -> Result<Self, ParseStatusError> {
        match kind {
            EntityKind::Workshop => value.parse().map(Self::Workshop),
            EntityKind::Attendee => value.parse().map(Self::Attendee),
        }
    }

    /// Kind of entity this status belongs to
    #[must_use]
    pub const fn kind(self) -> EntityKind {
        match self {
            Self::Workshop(_) => EntityKind::Workshop,
            Self::Attendee(_) => EntityKind::Attendee,
        }
    }

    /// Wire representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Workshop(status) => status.as_str(),
            Self::Attendee(status) => status.as_str(),
        }
    }

    /// The workshop status, if this is one
    #[must_use]
    pub const fn as_workshop(self) -> Option<WorkshopStatus> {
        match self {
            Self::Workshop(status) => Some(status),
            Self::Attendee(_) => None,
        }
    }

    /// The attendee status, if this is one
    #[must_use]
    pub const fn as_attendee(self) -> Option<AttendeeStatus> {
        match self {
            Self::Attendee(status) => Some(status),
            Self::Workshop(_) => None,
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workshop as returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workshop {
    /// Identity
    pub id: WorkshopId,
    /// Display name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Start of the time window
    pub start_date: DateTime<Utc>,
    /// End of the time window
    pub end_date: DateTime<Utc>,
    /// Authoritative status
    pub status: WorkshopStatus,
    /// Number of attendees (list form only)
    #[serde(default)]
    pub attendee_count: Option<u32>,
    /// Number of active attendees (list form only)
    #[serde(default)]
    pub active_attendees: Option<u32>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// An attendee as returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    /// Identity
    pub id: AttendeeId,
    /// Owning workshop. A lookup key only; the store's index is authoritative.
    pub workshop_id: WorkshopId,
    /// Login name
    pub username: String,
    /// Contact address
    pub email: String,
    /// Authoritative status
    pub status: AttendeeStatus,
    /// Cloud project assigned during deployment
    #[serde(default)]
    pub ovh_project_id: Option<String>,
    /// When the project is scheduled for teardown
    #[serde(default)]
    pub deletion_scheduled_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_round_trip_through_their_wire_names() {
        for status in WorkshopStatus::ALL {
            assert_eq!(status.as_str().parse::<WorkshopStatus>(), Ok(status));
        }
        for status in AttendeeStatus::ALL {
            assert_eq!(status.as_str().parse::<AttendeeStatus>(), Ok(status));
        }
    }

    #[test]
    fn kind_specific_statuses_are_rejected_for_the_other_kind() {
        assert!(EntityStatus::parse(EntityKind::Workshop, "deleted").is_err());
        assert!(EntityStatus::parse(EntityKind::Attendee, "completed").is_err());
        assert_eq!(
            EntityStatus::parse(EntityKind::Attendee, "deleted"),
            Ok(EntityStatus::Attendee(AttendeeStatus::Deleted))
        );
    }

    #[test]
    fn attendee_deserializes_with_optional_metadata_missing() {
        let json = r#"{
            "id": "a1",
            "workshop_id": "w1",
            "username": "ada",
            "email": "ada@example.com",
            "status": "deploying",
            "created_at": "2025-01-01T00:00:00Z"
        }"#;

        #[allow(clippy::unwrap_used)] // Test code: fixture is well-formed
        let attendee: Attendee = serde_json::from_str(json).unwrap();
        assert_eq!(attendee.status, AttendeeStatus::Deploying);
        assert_eq!(attendee.workshop_id, WorkshopId::new("w1"));
        assert!(attendee.ovh_project_id.is_none());
    }
}
