//! Everything that can happen to the client.
//!
//! User intents, fetch results, push events and timer firings all enter the
//! store as a [`SyncAction`].

use workshop_sync_core::SyncError;
use workshop_sync_core::api::{ApiError, WorkshopApi};
use workshop_sync_core::message::QueryKey;
use workshop_sync_core::model::{
    Attendee, AttendeeId, EntityRef, EntityStatus, Workshop, WorkshopId,
};
use workshop_sync_core::overlay::OptimisticAction;
use workshop_sync_core::push::PushEvent;

/// Actions processed by [`crate::SyncReducer`]
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    // Fetches
    /// Load the workshop list
    FetchWorkshops,
    /// Load one workshop
    FetchWorkshop(WorkshopId),
    /// Load the attendees of a workshop
    FetchAttendees(WorkshopId),
    /// Load one attendee
    FetchAttendee(AttendeeId),

    // Fetch results
    /// The workshop list arrived
    WorkshopsFetched(Vec<Workshop>),
    /// A workshop arrived
    WorkshopFetched(Workshop),
    /// A workshop's attendee list arrived
    AttendeesFetched {
        /// Owning workshop
        workshop_id: WorkshopId,
        /// Attendees in server order
        attendees: Vec<Attendee>,
    },
    /// An attendee arrived
    AttendeeFetched(Attendee),
    /// The server no longer knows the workshop
    WorkshopGone(WorkshopId),
    /// A read failed; the next poll retries it
    FetchFailed {
        /// Query that failed
        query: QueryKey,
        /// Why
        error: SyncError,
    },

    // User intents
    /// Start provisioning
    Deploy(EntityRef),
    /// Tear down provisioned resources
    Cleanup(EntityRef),
    /// Remove an attendee
    Delete(EntityRef),
    /// Provision again after a failure
    Retry(EntityRef),

    // Mutation results
    /// The server accepted a mutation
    MutationSucceeded {
        /// Target entity
        entity: EntityRef,
        /// Request the answer belongs to
        request_id: u64,
    },
    /// The server rejected a mutation
    MutationFailed {
        /// Target entity
        entity: EntityRef,
        /// Request the answer belongs to
        request_id: u64,
        /// Reported failure
        error: SyncError,
    },

    // Direct state changes
    /// Apply a validated lifecycle transition
    ApplyTransition {
        /// Entity to move
        entity: EntityRef,
        /// Target status
        to: EntityStatus,
    },
    /// Forget the recorded error of an entity
    ClearError(EntityRef),

    // Push channel
    /// Open the push channel (no-op if it is open or opening)
    Connect,
    /// Close the push channel on purpose
    Disconnect,
    /// Event from the push connection of the given generation
    Push {
        /// Connection the event came from
        generation: u64,
        /// What happened
        event: PushEvent,
    },
    /// Liveness probe timer fired
    PingTick,
    /// Backoff timer fired
    ReconnectTick,
}

impl SyncAction {
    /// The fetch that refreshes a stale query
    #[must_use]
    pub fn refetch(key: &QueryKey) -> Self {
        match key {
            QueryKey::WorkshopList => Self::FetchWorkshops,
            QueryKey::WorkshopDetail(id) => Self::FetchWorkshop(id.clone()),
            QueryKey::AttendeeList(id) => Self::FetchAttendees(id.clone()),
            QueryKey::AttendeeDetail(id) => Self::FetchAttendee(id.clone()),
        }
    }
}

/// A server mutation derived from a user intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// `deploy_workshop`
    DeployWorkshop(WorkshopId),
    /// `cleanup_workshop`
    CleanupWorkshop(WorkshopId),
    /// `deploy_attendee`
    DeployAttendee(AttendeeId),
    /// `cleanup_attendee`
    CleanupAttendee(AttendeeId),
    /// `delete_attendee`
    DeleteAttendee(AttendeeId),
}

impl Mutation {
    /// Request for `action` on `entity`; `None` for deleting a workshop
    #[must_use]
    pub fn for_intent(entity: &EntityRef, action: OptimisticAction) -> Option<Self> {
        use OptimisticAction::{Cleanup, DeleteEntity, Deploy, Retry};

        match (entity, action) {
            (EntityRef::Workshop(id), Deploy | Retry) => Some(Self::DeployWorkshop(id.clone())),
            (EntityRef::Workshop(id), Cleanup) => Some(Self::CleanupWorkshop(id.clone())),
            (EntityRef::Workshop(_), DeleteEntity) => None,
            (EntityRef::Attendee(id), Deploy | Retry) => Some(Self::DeployAttendee(id.clone())),
            (EntityRef::Attendee(id), Cleanup) => Some(Self::CleanupAttendee(id.clone())),
            (EntityRef::Attendee(id), DeleteEntity) => Some(Self::DeleteAttendee(id.clone())),
        }
    }

    /// Send the request.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or the transport failure.
    pub async fn send(self, api: &dyn WorkshopApi) -> Result<(), ApiError> {
        match self {
            Self::DeployWorkshop(id) => api.deploy_workshop(&id).await,
            Self::CleanupWorkshop(id) => api.cleanup_workshop(&id).await,
            Self::DeployAttendee(id) => api.deploy_attendee(&id).await,
            Self::CleanupAttendee(id) => api.cleanup_attendee(&id).await,
            Self::DeleteAttendee(id) => api.delete_attendee(&id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents_map_to_endpoints() {
        let workshop = EntityRef::Workshop(WorkshopId::new("w1"));
        let attendee = EntityRef::Attendee(AttendeeId::new("a1"));

        assert_eq!(
            Mutation::for_intent(&workshop, OptimisticAction::Retry),
            Some(Mutation::DeployWorkshop(WorkshopId::new("w1")))
        );
        assert_eq!(
            Mutation::for_intent(&attendee, OptimisticAction::DeleteEntity),
            Some(Mutation::DeleteAttendee(AttendeeId::new("a1")))
        );
        assert_eq!(
            Mutation::for_intent(&workshop, OptimisticAction::DeleteEntity),
            None
        );
    }

    #[test]
    fn stale_queries_map_to_fetches() {
        assert_eq!(
            SyncAction::refetch(&QueryKey::AttendeeList(WorkshopId::new("w1"))),
            SyncAction::FetchAttendees(WorkshopId::new("w1"))
        );
        assert_eq!(
            SyncAction::refetch(&QueryKey::WorkshopList),
            SyncAction::FetchWorkshops
        );
    }
}
