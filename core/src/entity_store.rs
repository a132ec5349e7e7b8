//! Normalized in-memory store of workshops and attendees.
//!
//! Entities are keyed by id; a separate index maps each workshop to the
//! ordered ids of its attendees. The store does no validation: it accepts
//! whatever authoritative data it is given. Every write goes through
//! [`EntityStore::apply`] so that each change is one loggable command.

use crate::model::{
    Attendee, AttendeeId, EntityRef, EntityStatus, Workshop, WorkshopId,
};
use std::collections::HashMap;

/// A write to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCommand {
    /// Insert or replace one workshop
    PutWorkshop(Workshop),
    /// Insert or replace several workshops (a list fetch)
    PutWorkshops(Vec<Workshop>),
    /// Insert or replace one attendee, indexing it under its workshop
    PutAttendee(Attendee),
    /// Replace the full attendee list of a workshop.
    ///
    /// Attendees previously indexed under the workshop but absent from the
    /// list are evicted.
    PutAttendees {
        /// Workshop whose list was fetched
        workshop_id: WorkshopId,
        /// Attendees in server order
        attendees: Vec<Attendee>,
    },
    /// Overwrite the status of a stored entity (no-op if it is unknown)
    SetStatus {
        /// Entity to update
        entity: EntityRef,
        /// New authoritative status
        status: EntityStatus,
    },
    /// Remove a workshop together with its attendees
    EvictWorkshop(WorkshopId),
    /// Remove one attendee and unindex it from its workshop
    EvictAttendee(AttendeeId),
}

impl StoreCommand {
    /// Short command name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PutWorkshop(_) => "put_workshop",
            Self::PutWorkshops(_) => "put_workshops",
            Self::PutAttendee(_) => "put_attendee",
            Self::PutAttendees { .. } => "put_attendees",
            Self::SetStatus { .. } => "set_status",
            Self::EvictWorkshop(_) => "evict_workshop",
            Self::EvictAttendee(_) => "evict_attendee",
        }
    }
}

/// What one [`StoreCommand`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreChange {
    /// Store revision after the command
    pub revision: u64,
    /// Entities written, with their new authoritative status
    pub written: Vec<(EntityRef, EntityStatus)>,
    /// Entities removed
    pub evicted: Vec<EntityRef>,
}

impl StoreChange {
    /// Whether the command left the store untouched
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.written.is_empty() && self.evicted.is_empty()
    }
}

/// The authoritative entity store.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    workshops: HashMap<WorkshopId, Workshop>,
    attendees: HashMap<AttendeeId, Attendee>,
    attendees_by_workshop: HashMap<WorkshopId, Vec<AttendeeId>>,
    revision: u64,
}

impl EntityStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one command and report what it changed.
    ///
    /// Every application bumps the revision, even when nothing changed.
    pub fn apply(&mut self, command: StoreCommand) -> StoreChange {
        let name = command.name();
        let mut change = StoreChange::default();

        match command {
            StoreCommand::PutWorkshop(workshop) => self.put_workshop(workshop, &mut change),
            StoreCommand::PutWorkshops(workshops) => {
                for workshop in workshops {
                    self.put_workshop(workshop, &mut change);
                }
            }
            StoreCommand::PutAttendee(attendee) => self.put_attendee(attendee, &mut change),
            StoreCommand::PutAttendees {
                workshop_id,
                attendees,
            } => self.replace_attendees(&workshop_id, attendees, &mut change),
            StoreCommand::SetStatus { entity, status } => {
                self.set_status(entity, status, &mut change);
            }
            StoreCommand::EvictWorkshop(id) => self.evict_workshop(&id, &mut change),
            StoreCommand::EvictAttendee(id) => self.remove_attendee(&id, &mut change),
        }

        self.revision += 1;
        change.revision = self.revision;

        tracing::debug!(
            command = name,
            revision = self.revision,
            written = change.written.len(),
            evicted = change.evicted.len(),
            "Store command applied"
        );

        change
    }

    fn put_workshop(&mut self, workshop: Workshop, change: &mut StoreChange) {
        change.written.push((
            EntityRef::Workshop(workshop.id.clone()),
            EntityStatus::Workshop(workshop.status),
        ));
        self.workshops.insert(workshop.id.clone(), workshop);
    }

    fn put_attendee(&mut self, attendee: Attendee, change: &mut StoreChange) {
        let previous_workshop = self
            .attendees
            .get(&attendee.id)
            .map(|existing| existing.workshop_id.clone());

        if let Some(previous) = previous_workshop.filter(|w| *w != attendee.workshop_id) {
            self.unindex(&previous, &attendee.id);
        }

        let list = self
            .attendees_by_workshop
            .entry(attendee.workshop_id.clone())
            .or_default();
        if !list.contains(&attendee.id) {
            list.push(attendee.id.clone());
        }

        change.written.push((
            EntityRef::Attendee(attendee.id.clone()),
            EntityStatus::Attendee(attendee.status),
        ));
        self.attendees.insert(attendee.id.clone(), attendee);
    }

    fn replace_attendees(
        &mut self,
        workshop_id: &WorkshopId,
        attendees: Vec<Attendee>,
        change: &mut StoreChange,
    ) {
        let stale: Vec<AttendeeId> = self
            .attendee_ids_of(workshop_id)
            .iter()
            .filter(|id| !attendees.iter().any(|a| a.id == **id))
            .cloned()
            .collect();
        for id in stale {
            self.remove_attendee(&id, change);
        }

        for attendee in attendees {
            self.put_attendee(attendee, change);
        }

        // Server order wins over insertion order
        let mut order: Vec<AttendeeId> = Vec::new();
        for (entity, _) in &change.written {
            let EntityRef::Attendee(id) = entity else {
                continue;
            };
            let belongs = self
                .attendees
                .get(id)
                .is_some_and(|a| a.workshop_id == *workshop_id);
            if belongs && !order.contains(id) {
                order.push(id.clone());
            }
        }
        self.attendees_by_workshop.insert(workshop_id.clone(), order);
    }

    fn set_status(&mut self, entity: EntityRef, status: EntityStatus, change: &mut StoreChange) {
        let written = match (&entity, status) {
            (EntityRef::Workshop(id), EntityStatus::Workshop(new)) => {
                self.workshops.get_mut(id).map(|w| w.status = new).is_some()
            }
            (EntityRef::Attendee(id), EntityStatus::Attendee(new)) => {
                self.attendees.get_mut(id).map(|a| a.status = new).is_some()
            }
            _ => false,
        };
        if written {
            change.written.push((entity, status));
        }
    }

    fn evict_workshop(&mut self, id: &WorkshopId, change: &mut StoreChange) {
        for attendee_id in self.attendees_by_workshop.remove(id).unwrap_or_default() {
            if self.attendees.remove(&attendee_id).is_some() {
                change.evicted.push(EntityRef::Attendee(attendee_id));
            }
        }
        if self.workshops.remove(id).is_some() {
            change.evicted.push(EntityRef::Workshop(id.clone()));
        }
    }

    fn remove_attendee(&mut self, id: &AttendeeId, change: &mut StoreChange) {
        if let Some(attendee) = self.attendees.remove(id) {
            self.unindex(&attendee.workshop_id, id);
            change.evicted.push(EntityRef::Attendee(id.clone()));
        }
    }

    fn unindex(&mut self, workshop_id: &WorkshopId, attendee_id: &AttendeeId) {
        if let Some(list) = self.attendees_by_workshop.get_mut(workshop_id) {
            list.retain(|id| id != attendee_id);
        }
    }

    /// Look up a workshop
    #[must_use]
    pub fn workshop(&self, id: &WorkshopId) -> Option<&Workshop> {
        self.workshops.get(id)
    }

    /// Look up an attendee
    #[must_use]
    pub fn attendee(&self, id: &AttendeeId) -> Option<&Attendee> {
        self.attendees.get(id)
    }

    /// All stored workshops, in no particular order
    pub fn workshops(&self) -> impl Iterator<Item = &Workshop> {
        self.workshops.values()
    }

    /// Ids of the attendees of `workshop_id`, in index order
    #[must_use]
    pub fn attendee_ids_of(&self, workshop_id: &WorkshopId) -> &[AttendeeId] {
        self.attendees_by_workshop
            .get(workshop_id)
            .map_or(&[], Vec::as_slice)
    }

    /// Attendees of `workshop_id`, in index order
    #[must_use]
    pub fn list_attendees_of(&self, workshop_id: &WorkshopId) -> Vec<&Attendee> {
        self.attendee_ids_of(workshop_id)
            .iter()
            .filter_map(|id| self.attendees.get(id))
            .collect()
    }

    /// Owning workshop of a stored attendee
    #[must_use]
    pub fn workshop_of(&self, attendee_id: &AttendeeId) -> Option<&WorkshopId> {
        self.attendees.get(attendee_id).map(|a| &a.workshop_id)
    }

    /// Authoritative status of any stored entity
    #[must_use]
    pub fn status(&self, entity: &EntityRef) -> Option<EntityStatus> {
        match entity {
            EntityRef::Workshop(id) => self
                .workshops
                .get(id)
                .map(|w| EntityStatus::Workshop(w.status)),
            EntityRef::Attendee(id) => self
                .attendees
                .get(id)
                .map(|a| EntityStatus::Attendee(a.status)),
        }
    }

    /// Whether the entity is stored
    #[must_use]
    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.status(entity).is_some()
    }

    /// Number of applied commands
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }
}
