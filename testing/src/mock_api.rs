//! In-memory workshop server.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use workshop_sync_core::api::{ApiError, WorkshopApi};
use workshop_sync_core::model::{
    Attendee, AttendeeId, AttendeeStatus, Workshop, WorkshopId, WorkshopStatus,
};

/// One call received by [`MockWorkshopApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    /// `list_workshops`
    ListWorkshops,
    /// `get_workshop`
    GetWorkshop(WorkshopId),
    /// `get_workshop_attendees`
    GetWorkshopAttendees(WorkshopId),
    /// `get_attendee`
    GetAttendee(AttendeeId),
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

impl ApiCall {
    /// Whether the call is a mutation
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::DeployWorkshop(_)
                | Self::CleanupWorkshop(_)
                | Self::DeployAttendee(_)
                | Self::CleanupAttendee(_)
                | Self::DeleteAttendee(_)
        )
    }
}

#[derive(Debug, Default)]
struct Server {
    workshops: HashMap<WorkshopId, Workshop>,
    attendees: Vec<Attendee>,
    calls: Vec<ApiCall>,
    mutation_failure: Option<ApiError>,
}

impl Server {
    fn workshop(&self, id: &WorkshopId) -> Result<Workshop, ApiError> {
        self.workshops
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::new(404, format!("Workshop {id} not found")))
    }

    fn attendee_mut(&mut self, id: &AttendeeId) -> Result<&mut Attendee, ApiError> {
        self.attendees
            .iter_mut()
            .find(|a| a.id == *id)
            .ok_or_else(|| ApiError::new(404, format!("Attendee {id} not found")))
    }

    fn mutate(&mut self, call: ApiCall) -> Result<(), ApiError> {
        self.calls.push(call);
        match &self.mutation_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// In-memory [`WorkshopApi`] with a tiny server-side lifecycle.
///
/// Mutations move entities the way the server starts doing it: deploy puts
/// the target (and planning attendees of a workshop) into `deploying`,
/// cleanup into `deleting`. Tests finish provisioning with the `set_*`
/// methods.
#[derive(Debug, Clone, Default)]
pub struct MockWorkshopApi {
    server: Arc<Mutex<Server>>,
}

impl MockWorkshopApi {
    /// Create an empty server
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a workshop
    #[must_use]
    pub fn with_workshop(self, workshop: Workshop) -> Self {
        self.server
            .lock()
            .unwrap()
            .workshops
            .insert(workshop.id.clone(), workshop);
        self
    }

    /// Seed attendees
    #[must_use]
    pub fn with_attendees(self, attendees: impl IntoIterator<Item = Attendee>) -> Self {
        self.server.lock().unwrap().attendees.extend(attendees);
        self
    }

    /// Make every subsequent mutation fail with `error`
    pub fn fail_mutations_with(&self, error: ApiError) {
        self.server.lock().unwrap().mutation_failure = Some(error);
    }

    /// Let mutations succeed again
    pub fn accept_mutations(&self) {
        self.server.lock().unwrap().mutation_failure = None;
    }

    /// Change a workshop's status server-side
    pub fn set_workshop_status(&self, id: &WorkshopId, status: WorkshopStatus) {
        if let Some(workshop) = self.server.lock().unwrap().workshops.get_mut(id) {
            workshop.status = status;
        }
    }

    /// Change an attendee's status server-side
    pub fn set_attendee_status(&self, id: &AttendeeId, status: AttendeeStatus) {
        if let Ok(attendee) = self.server.lock().unwrap().attendee_mut(id) {
            attendee.status = status;
        }
    }

    /// Calls received so far
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.server.lock().unwrap().calls.clone()
    }

    /// Mutations received so far
    #[must_use]
    pub fn mutations(&self) -> Vec<ApiCall> {
        self.calls().into_iter().filter(ApiCall::is_mutation).collect()
    }
}

#[async_trait]
impl WorkshopApi for MockWorkshopApi {
    async fn list_workshops(&self) -> Result<Vec<Workshop>, ApiError> {
        let mut server = self.server.lock().unwrap();
        server.calls.push(ApiCall::ListWorkshops);

        let mut workshops: Vec<Workshop> = server.workshops.values().cloned().collect();
        workshops.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        for workshop in &mut workshops {
            let members = server.attendees.iter().filter(|a| a.workshop_id == workshop.id);
            let (count, active) = members.fold((0, 0), |(count, active), a| {
                (count + 1, active + u32::from(a.status == AttendeeStatus::Active))
            });
            workshop.attendee_count = Some(count);
            workshop.active_attendees = Some(active);
        }
        Ok(workshops)
    }

    async fn get_workshop(&self, id: &WorkshopId) -> Result<Workshop, ApiError> {
        let mut server = self.server.lock().unwrap();
        server.calls.push(ApiCall::GetWorkshop(id.clone()));
        server.workshop(id)
    }

    async fn get_workshop_attendees(&self, id: &WorkshopId) -> Result<Vec<Attendee>, ApiError> {
        let mut server = self.server.lock().unwrap();
        server.calls.push(ApiCall::GetWorkshopAttendees(id.clone()));
        server.workshop(id)?;
        Ok(server
            .attendees
            .iter()
            .filter(|a| a.workshop_id == *id)
            .cloned()
            .collect())
    }

    async fn get_attendee(&self, id: &AttendeeId) -> Result<Attendee, ApiError> {
        let mut server = self.server.lock().unwrap();
        server.calls.push(ApiCall::GetAttendee(id.clone()));
        server.attendee_mut(id).map(|a| a.clone())
    }

    async fn deploy_workshop(&self, id: &WorkshopId) -> Result<(), ApiError> {
        let mut server = self.server.lock().unwrap();
        server.mutate(ApiCall::DeployWorkshop(id.clone()))?;
        let mut workshop = server.workshop(id)?;
        workshop.status = WorkshopStatus::Deploying;
        server.workshops.insert(id.clone(), workshop);
        for attendee in server.attendees.iter_mut().filter(|a| a.workshop_id == *id) {
            if attendee.status == AttendeeStatus::Planning {
                attendee.status = AttendeeStatus::Deploying;
            }
        }
        Ok(())
    }

    async fn cleanup_workshop(&self, id: &WorkshopId) -> Result<(), ApiError> {
        let mut server = self.server.lock().unwrap();
        server.mutate(ApiCall::CleanupWorkshop(id.clone()))?;
        let mut workshop = server.workshop(id)?;
        workshop.status = WorkshopStatus::Deleting;
        server.workshops.insert(id.clone(), workshop);
        for attendee in server.attendees.iter_mut().filter(|a| a.workshop_id == *id) {
            if matches!(attendee.status, AttendeeStatus::Active | AttendeeStatus::Failed) {
                attendee.status = AttendeeStatus::Deleting;
            }
        }
        Ok(())
    }

    async fn deploy_attendee(&self, id: &AttendeeId) -> Result<(), ApiError> {
        let mut server = self.server.lock().unwrap();
        server.mutate(ApiCall::DeployAttendee(id.clone()))?;
        server.attendee_mut(id)?.status = AttendeeStatus::Deploying;
        Ok(())
    }

    async fn cleanup_attendee(&self, id: &AttendeeId) -> Result<(), ApiError> {
        let mut server = self.server.lock().unwrap();
        server.mutate(ApiCall::CleanupAttendee(id.clone()))?;
        server.attendee_mut(id)?.status = AttendeeStatus::Deleting;
        Ok(())
    }

    async fn delete_attendee(&self, id: &AttendeeId) -> Result<(), ApiError> {
        let mut server = self.server.lock().unwrap();
        server.mutate(ApiCall::DeleteAttendee(id.clone()))?;
        server.attendee_mut(id)?;
        server.attendees.retain(|a| a.id != *id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn seeded() -> MockWorkshopApi {
        MockWorkshopApi::new()
            .with_workshop(fixtures::workshop("w1", WorkshopStatus::Planning))
            .with_attendees([
                fixtures::attendee("a1", "w1", AttendeeStatus::Planning),
                fixtures::attendee("a2", "w1", AttendeeStatus::Active),
            ])
    }

    #[tokio::test]
    async fn deploy_moves_workshop_and_planning_attendees() {
        let api = seeded();
        api.deploy_workshop(&WorkshopId::new("w1")).await.unwrap();

        let workshop = api.get_workshop(&WorkshopId::new("w1")).await.unwrap();
        let attendees = api.get_workshop_attendees(&WorkshopId::new("w1")).await.unwrap();

        assert_eq!(workshop.status, WorkshopStatus::Deploying);
        assert_eq!(attendees[0].status, AttendeeStatus::Deploying);
        assert_eq!(attendees[1].status, AttendeeStatus::Active);
    }

    #[tokio::test]
    async fn scripted_failure_carries_the_detail() {
        let api = seeded();
        api.fail_mutations_with(ApiError::new(409, "Workshop is already deploying"));

        let error = api.deploy_workshop(&WorkshopId::new("w1")).await.unwrap_err();

        assert_eq!(error.detail, "Workshop is already deploying");
        assert_eq!(api.mutations(), vec![ApiCall::DeployWorkshop(WorkshopId::new("w1"))]);
        let workshop = api.get_workshop(&WorkshopId::new("w1")).await.unwrap();
        assert_eq!(workshop.status, WorkshopStatus::Planning);
    }

    #[tokio::test]
    async fn list_form_carries_counters() {
        let workshops = seeded().list_workshops().await.unwrap();
        assert_eq!(workshops[0].attendee_count, Some(2));
        assert_eq!(workshops[0].active_attendees, Some(1));
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let error = seeded().get_attendee(&AttendeeId::new("nope")).await.unwrap_err();
        assert!(error.is_not_found());
    }
}
