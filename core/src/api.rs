//! Fetch and mutation interface of the workshop server.

use crate::error::SyncError;
use crate::model::{Attendee, AttendeeId, Workshop, WorkshopId};
use async_trait::async_trait;
use thiserror::Error;

/// A request the server rejected or that never reached it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{detail}")]
pub struct ApiError {
    /// HTTP status, if a response was received
    pub status: Option<u16>,
    /// Server-reported detail, or the transport error
    pub detail: String,
}

impl ApiError {
    /// Error with a response status
    #[must_use]
    pub fn new(status: u16, detail: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            detail: detail.into(),
        }
    }

    /// Error raised before any response arrived
    #[must_use]
    pub fn transport(detail: impl Into<String>) -> Self {
        Self {
            status: None,
            detail: detail.into(),
        }
    }

    /// Whether the server answered 404
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }

    /// The error as a rejected mutation
    #[must_use]
    pub fn into_request_failed(self) -> SyncError {
        SyncError::RequestFailed {
            detail: self.detail,
        }
    }

    /// The error as a failed read
    #[must_use]
    pub fn into_fetch_failed(self) -> SyncError {
        SyncError::FetchFailed {
            detail: self.detail,
        }
    }
}

/// Server operations the sync core needs.
///
/// Mutations resolve once the server accepted the request; the resulting
/// status arrives later through a fetch or a push notification.
#[async_trait]
pub trait WorkshopApi: Send + Sync {
    /// All workshops, in list form
    async fn list_workshops(&self) -> Result<Vec<Workshop>, ApiError>;

    /// One workshop
    async fn get_workshop(&self, id: &WorkshopId) -> Result<Workshop, ApiError>;

    /// Attendees of a workshop, in server order
    async fn get_workshop_attendees(&self, id: &WorkshopId) -> Result<Vec<Attendee>, ApiError>;

    /// One attendee
    async fn get_attendee(&self, id: &AttendeeId) -> Result<Attendee, ApiError>;

    /// Start deploying a workshop and its attendees
    async fn deploy_workshop(&self, id: &WorkshopId) -> Result<(), ApiError>;

    /// Tear down a workshop's resources
    async fn cleanup_workshop(&self, id: &WorkshopId) -> Result<(), ApiError>;

    /// Start deploying one attendee
    async fn deploy_attendee(&self, id: &AttendeeId) -> Result<(), ApiError>;

    /// Tear down one attendee's resources
    async fn cleanup_attendee(&self, id: &AttendeeId) -> Result<(), ApiError>;

    /// Remove an attendee
    async fn delete_attendee(&self, id: &AttendeeId) -> Result<(), ApiError>;
}
