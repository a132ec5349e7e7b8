//! Sync reducer: every state change of the client happens here.
//!
//! Three kinds of input meet in this reducer:
//!
//! 1. User intents predict a status in the overlay and send a mutation
//! 2. Fetch results and push updates write authoritative data
//! 3. Push connection events drive the channel state machine
//!
//! Authoritative writes go through [`SyncState::apply`], which lets the
//! overlay catch up. Predictions are only ever written to the overlay.

use crate::actions::{Mutation, SyncAction};
use crate::environment::SyncEnvironment;
use crate::state::{CascadedPrediction, ChannelPhase, PendingMutation, RecordedError, SyncState};
use std::sync::Arc;
use workshop_sync_core::effect::{Effect, PushOperation, TimerId};
use workshop_sync_core::entity_store::StoreCommand;
use workshop_sync_core::message::{
    OutboundMessage, PushMessage, QueryKey, StatusUpdate, attendee_scopes, close_code,
    workshop_scopes,
};
use workshop_sync_core::model::{AttendeeId, EntityRef, EntityStatus, WorkshopId};
use workshop_sync_core::overlay::OptimisticAction;
use workshop_sync_core::push::PushEvent;
use workshop_sync_core::reducer::Reducer;
use workshop_sync_core::transition::validate_status;
use workshop_sync_core::{SmallVec, SyncError, smallvec};
use workshop_sync_runtime::metrics::PushMetrics;

type Effects = SmallVec<[Effect<SyncAction>; 4]>;

/// Reducer keeping [`SyncState`] in step with the server
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncReducer;

impl SyncReducer {
    /// Creates a new sync reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    // ========== Fetches ==========

    fn fetch_workshops(env: &SyncEnvironment) -> Effect<SyncAction> {
        let api = Arc::clone(&env.api);
        Effect::Future(Box::pin(async move {
            Some(match api.list_workshops().await {
                Ok(workshops) => SyncAction::WorkshopsFetched(workshops),
                Err(error) => SyncAction::FetchFailed {
                    query: QueryKey::WorkshopList,
                    error: error.into_fetch_failed(),
                },
            })
        }))
    }

    fn fetch_workshop(env: &SyncEnvironment, id: WorkshopId) -> Effect<SyncAction> {
        let api = Arc::clone(&env.api);
        Effect::Future(Box::pin(async move {
            Some(match api.get_workshop(&id).await {
                Ok(workshop) => SyncAction::WorkshopFetched(workshop),
                Err(error) if error.is_not_found() => SyncAction::WorkshopGone(id),
                Err(error) => SyncAction::FetchFailed {
                    query: QueryKey::WorkshopDetail(id),
                    error: error.into_fetch_failed(),
                },
            })
        }))
    }

    fn fetch_attendees(env: &SyncEnvironment, id: WorkshopId) -> Effect<SyncAction> {
        let api = Arc::clone(&env.api);
        Effect::Future(Box::pin(async move {
            Some(match api.get_workshop_attendees(&id).await {
                Ok(attendees) => SyncAction::AttendeesFetched {
                    workshop_id: id,
                    attendees,
                },
                Err(error) if error.is_not_found() => SyncAction::WorkshopGone(id),
                Err(error) => SyncAction::FetchFailed {
                    query: QueryKey::AttendeeList(id),
                    error: error.into_fetch_failed(),
                },
            })
        }))
    }

    /// A vanished attendee refreshes its workshop's list, which evicts it
    fn fetch_attendee(
        state: &SyncState,
        env: &SyncEnvironment,
        id: AttendeeId,
    ) -> Effect<SyncAction> {
        let api = Arc::clone(&env.api);
        let owner = state.entities.workshop_of(&id).cloned();
        Effect::Future(Box::pin(async move {
            Some(match (api.get_attendee(&id).await, owner) {
                (Ok(attendee), _) => SyncAction::AttendeeFetched(attendee),
                (Err(error), Some(owner)) if error.is_not_found() => {
                    SyncAction::FetchAttendees(owner)
                }
                (Err(error), _) => SyncAction::FetchFailed {
                    query: QueryKey::AttendeeDetail(id),
                    error: error.into_fetch_failed(),
                },
            })
        }))
    }

    // ========== Mutations ==========

    /// Predict, then send the mutation for a user intent.
    ///
    /// Nothing is predicted or sent when the intent is not meaningful for
    /// the entity's authoritative status; a `ConditionNotMet` is recorded
    /// instead.
    fn request(
        state: &mut SyncState,
        entity: EntityRef,
        action: OptimisticAction,
        env: &SyncEnvironment,
    ) -> Effects {
        let now = env.clock.now();

        let Some(current) = state.entities.status(&entity) else {
            let error = SyncError::ConditionNotMet(format!("{entity} is not loaded"));
            state.record_error(entity, error, now);
            return SmallVec::new();
        };
        let Some(mutation) = Mutation::for_intent(&entity, action) else {
            let error = SyncError::ConditionNotMet(format!("cannot {action} a {}", entity.kind()));
            state.record_error(entity, error, now);
            return SmallVec::new();
        };
        let Some(target) = state.overlay.apply(entity.clone(), action, current) else {
            let error =
                SyncError::ConditionNotMet(format!("cannot {action} {entity} while it is {current}"));
            state.record_error(entity, error, now);
            return SmallVec::new();
        };

        state.settling.remove(&entity);
        let cascaded = match &entity {
            EntityRef::Workshop(id) => Self::cascade(state, id, action),
            EntityRef::Attendee(_) => Vec::new(),
        };

        let request_id = state.next_request_id();
        let superseded = state.pending.insert(
            entity.clone(),
            PendingMutation {
                request_id,
                action,
                based_on: current,
                target,
                cascaded,
            },
        );
        if let Some(previous) = superseded {
            tracing::debug!(%entity, superseded = previous.request_id, "Newer request supersedes");
        }

        tracing::info!(%entity, %action, %target, request_id, "Mutation requested");

        let api = Arc::clone(&env.api);
        smallvec![Effect::Future(Box::pin(async move {
            Some(match mutation.send(api.as_ref()).await {
                Ok(()) => SyncAction::MutationSucceeded { entity, request_id },
                Err(error) => SyncAction::MutationFailed {
                    entity,
                    request_id,
                    error: error.into_request_failed(),
                },
            })
        }))]
    }

    /// Predict `action` for every attendee of the workshop it is meaningful for
    fn cascade(
        state: &mut SyncState,
        workshop_id: &WorkshopId,
        action: OptimisticAction,
    ) -> Vec<CascadedPrediction> {
        let attendees = state.entities.attendee_ids_of(workshop_id).to_vec();

        attendees
            .into_iter()
            .filter_map(|id| {
                let entity = EntityRef::Attendee(id);
                let based_on = state.entities.status(&entity)?;
                let predicted = state.overlay.apply(entity.clone(), action, based_on)?;
                state.settling.remove(&entity);
                Some(CascadedPrediction {
                    entity,
                    based_on,
                    predicted,
                })
            })
            .collect()
    }

    /// Cascaded attendees still showing the prediction their workshop made
    fn unreplaced(state: &SyncState, cascaded: &[CascadedPrediction]) -> Vec<EntityRef> {
        cascaded
            .iter()
            .filter(|c| {
                state.overlay.predicted(&c.entity) == Some(c.predicted)
                    && !state.pending.contains_key(&c.entity)
            })
            .map(|c| c.entity.clone())
            .collect()
    }

    /// Remove the pending mutation if `request_id` is still the current one
    fn take_current(
        state: &mut SyncState,
        entity: &EntityRef,
        request_id: u64,
    ) -> Option<PendingMutation> {
        match state.pending.get(entity) {
            Some(pending) if pending.request_id == request_id => state.pending.remove(entity),
            _ => None,
        }
    }

    /// Commit a confirmed mutation through the validator.
    ///
    /// Accepted without writing when the store already holds the target (a
    /// push got there first) or has moved past the status the prediction
    /// was based on.
    fn commit(
        state: &mut SyncState,
        entity: &EntityRef,
        based_on: EntityStatus,
        target: EntityStatus,
    ) -> Result<(), SyncError> {
        let current = state
            .entities
            .status(entity)
            .ok_or_else(|| SyncError::ConditionNotMet(format!("{entity} is not loaded")))?;

        if current == target {
            return Ok(());
        }
        if current != based_on {
            tracing::debug!(%entity, %current, %target, "Server moved on before confirmation");
            return Ok(());
        }

        validate_status(current, target)?;
        state.apply(StoreCommand::SetStatus {
            entity: entity.clone(),
            status: target,
        });
        Ok(())
    }

    fn confirm(
        state: &mut SyncState,
        entity: EntityRef,
        request_id: u64,
        env: &SyncEnvironment,
    ) -> Effects {
        let Some(pending) = Self::take_current(state, &entity, request_id) else {
            tracing::debug!(%entity, request_id, "Superseded request confirmed");
            return SmallVec::new();
        };
        metrics::counter!("sync.mutations.completed", "outcome" => "accepted").increment(1);

        // Scopes need the attendee's workshop, which eviction forgets
        let scopes = Self::scopes(state, &entity, None);

        let committed = match (&entity, pending.action) {
            (EntityRef::Attendee(id), OptimisticAction::DeleteEntity) => {
                // The server no longer has the attendee
                state.apply(StoreCommand::EvictAttendee(id.clone()));
                Ok(())
            }
            _ => Self::commit(state, &entity, pending.based_on, pending.target),
        };

        state.overlay.clear(&entity);
        for attendee in Self::unreplaced(state, &pending.cascaded) {
            state.settling.insert(attendee);
        }
        match committed {
            Ok(()) => {
                state.errors.remove(&entity);
                tracing::info!(%entity, target = %pending.target, "Mutation confirmed");
            }
            Err(error) => state.record_error(entity.clone(), error, env.clock.now()),
        }

        scopes
            .into_iter()
            .flatten()
            .map(|key| Effect::invalidate(&env.cache, key))
            .collect()
    }

    fn roll_back(
        state: &mut SyncState,
        entity: EntityRef,
        request_id: u64,
        error: SyncError,
        env: &SyncEnvironment,
    ) -> Effects {
        metrics::counter!("sync.mutations.completed", "outcome" => "rejected").increment(1);

        if let Some(pending) = Self::take_current(state, &entity, request_id) {
            state.overlay.clear(&entity);
            for attendee in Self::unreplaced(state, &pending.cascaded) {
                state.overlay.clear(&attendee);
            }
            tracing::warn!(%entity, %error, "Mutation rejected, prediction rolled back");
        } else {
            tracing::warn!(%entity, %error, request_id, "Superseded mutation rejected");
        }

        state.record_error(entity, error, env.clock.now());
        SmallVec::new()
    }

    fn transition(
        state: &mut SyncState,
        entity: EntityRef,
        to: EntityStatus,
        env: &SyncEnvironment,
    ) -> Effects {
        let Some(current) = state.entities.status(&entity) else {
            let error = SyncError::ConditionNotMet(format!("{entity} is not loaded"));
            state.record_error(entity, error, env.clock.now());
            return SmallVec::new();
        };

        if current != to {
            if let Err(error) = validate_status(current, to) {
                state.record_error(entity, error, env.clock.now());
                return SmallVec::new();
            }
            state.apply(StoreCommand::SetStatus {
                entity: entity.clone(),
                status: to,
            });
            tracing::info!(%entity, from = %current, %to, "Transition applied");
        }

        state.overlay.clear(&entity);
        state.errors.remove(&entity);
        SmallVec::new()
    }

    // ========== Push channel ==========

    fn connect(state: &mut SyncState, env: &SyncEnvironment) -> Effects {
        match state.channel.phase {
            ChannelPhase::Connecting | ChannelPhase::Open | ChannelPhase::Reconnecting => {
                tracing::debug!(phase = ?state.channel.phase, "Push channel already active");
                SmallVec::new()
            }
            ChannelPhase::Idle | ChannelPhase::Closed => {
                state.channel.attempts = 0;
                Self::open(state, env)
            }
        }
    }

    fn open(state: &mut SyncState, env: &SyncEnvironment) -> Effects {
        state.channel.generation += 1;
        state.channel.phase = ChannelPhase::Connecting;

        let generation = state.channel.generation;
        tracing::info!(generation, attempt = state.channel.attempts, "Opening push channel");

        smallvec![Effect::Push(PushOperation::Open {
            transport: Arc::clone(&env.transport),
            on_event: Arc::new(move |event| Some(SyncAction::Push { generation, event })),
        })]
    }

    fn disconnect(state: &mut SyncState) -> Effects {
        tracing::info!(phase = ?state.channel.phase, "Closing push channel");

        state.channel.phase = ChannelPhase::Idle;
        state.channel.attempts = 0;
        // Anything the old connection still delivers is stale.
        state.channel.generation += 1;

        smallvec![
            Effect::cancel(TimerId::LivenessProbe),
            Effect::cancel(TimerId::Reconnect),
            Effect::Push(PushOperation::Close {
                code: close_code::INTENTIONAL,
                reason: "client disconnect".to_string(),
            }),
        ]
    }

    fn on_open(state: &mut SyncState, env: &SyncEnvironment) -> Effects {
        state.channel.phase = ChannelPhase::Open;
        state.channel.attempts = 0;
        state.channel.connection_error = None;
        tracing::info!(generation = state.channel.generation, "Push channel open");

        smallvec![Effect::schedule(
            TimerId::LivenessProbe,
            env.ping_interval,
            true,
            SyncAction::PingTick,
        )]
    }

    fn on_closed(
        state: &mut SyncState,
        code: Option<u16>,
        reason: &str,
        env: &SyncEnvironment,
    ) -> Effects {
        let mut effects: Effects = smallvec![Effect::cancel(TimerId::LivenessProbe)];

        if close_code::is_expected(code) {
            tracing::info!(?code, reason, "Push channel closed");
            state.channel.phase = ChannelPhase::Closed;
            state.channel.attempts = 0;
            return effects;
        }

        let policy = &env.reconnect;
        if policy.should_retry(state.channel.attempts) {
            state.channel.attempts += 1;
            let delay = policy.delay_for_attempt(state.channel.attempts, env.jitter.sample());
            state.channel.phase = ChannelPhase::Reconnecting;
            tracing::warn!(
                ?code,
                reason,
                attempt = state.channel.attempts,
                delay_ms = delay.as_millis(),
                "Push channel dropped, reconnecting"
            );
            effects.push(Effect::schedule(
                TimerId::Reconnect,
                delay,
                false,
                SyncAction::ReconnectTick,
            ));
        } else {
            state.channel.phase = ChannelPhase::Closed;
            let error = SyncError::ConnectionError(format!(
                "gave up after {} reconnect attempts: {reason}",
                state.channel.attempts
            ));
            tracing::error!(%error, "Push channel unavailable, relying on polling");
            state.channel.connection_error = Some(RecordedError {
                error,
                recorded_at: env.clock.now(),
            });
        }

        effects
    }

    fn on_message(state: &mut SyncState, text: &str, env: &SyncEnvironment) -> Effects {
        let message = match PushMessage::parse(text) {
            Ok(message) => message,
            Err(error) => return Self::drop_message(&error),
        };

        match message {
            PushMessage::StatusUpdate(envelope) => match envelope.into_update() {
                Ok(update) => Self::status_update(state, update, env),
                Err(error) => Self::drop_message(&error),
            },
            PushMessage::Connection { message, .. } => {
                tracing::info!(greeting = message.as_deref().unwrap_or(""), "Push server greeting");
                SmallVec::new()
            }
            PushMessage::Pong { .. } => {
                tracing::trace!("Pong received");
                SmallVec::new()
            }
            PushMessage::Unknown => {
                tracing::debug!("Ignoring push message of unknown type");
                SmallVec::new()
            }
        }
    }

    fn drop_message(error: &SyncError) -> Effects {
        tracing::warn!(%error, "Dropping push message");
        PushMetrics::record_dropped();
        SmallVec::new()
    }

    /// Write the pushed status and invalidate every query it makes stale
    fn status_update(state: &mut SyncState, update: StatusUpdate, env: &SyncEnvironment) -> Effects {
        let Some(keys) = Self::scopes(state, &update.entity, update.workshop_id) else {
            let error =
                SyncError::MalformedMessage(format!("no workshop known for {}", update.entity));
            return Self::drop_message(&error);
        };

        tracing::debug!(entity = %update.entity, status = %update.status, "Status update pushed");
        if state.entities.contains(&update.entity) {
            state.apply(StoreCommand::SetStatus {
                entity: update.entity,
                status: update.status,
            });
        }

        keys.into_iter()
            .map(|key| Effect::invalidate(&env.cache, key))
            .collect()
    }

    /// Queries made stale by a change to `entity`.
    ///
    /// `None` for an attendee whose workshop is neither given nor known.
    fn scopes(
        state: &SyncState,
        entity: &EntityRef,
        workshop_id: Option<WorkshopId>,
    ) -> Option<Vec<QueryKey>> {
        match entity {
            EntityRef::Workshop(id) => Some(workshop_scopes(id).to_vec()),
            EntityRef::Attendee(id) => {
                let workshop_id =
                    workshop_id.or_else(|| state.entities.workshop_of(id).cloned())?;
                Some(attendee_scopes(id, &workshop_id).to_vec())
            }
        }
    }
}

impl Reducer for SyncReducer {
    type State = SyncState;
    type Action = SyncAction;
    type Environment = SyncEnvironment;

    fn reduce(
        &self,
        state: &mut SyncState,
        action: SyncAction,
        env: &SyncEnvironment,
    ) -> Effects {
        match action {
            SyncAction::FetchWorkshops => smallvec![Self::fetch_workshops(env)],
            SyncAction::FetchWorkshop(id) => smallvec![Self::fetch_workshop(env, id)],
            SyncAction::FetchAttendees(id) => smallvec![Self::fetch_attendees(env, id)],
            SyncAction::FetchAttendee(id) => smallvec![Self::fetch_attendee(state, env, id)],

            SyncAction::WorkshopsFetched(workshops) => {
                state.apply(StoreCommand::PutWorkshops(workshops));
                SmallVec::new()
            }
            SyncAction::WorkshopFetched(workshop) => {
                state.apply(StoreCommand::PutWorkshop(workshop));
                SmallVec::new()
            }
            SyncAction::AttendeesFetched {
                workshop_id,
                attendees,
            } => {
                state.apply(StoreCommand::PutAttendees {
                    workshop_id,
                    attendees,
                });
                SmallVec::new()
            }
            SyncAction::AttendeeFetched(attendee) => {
                state.apply(StoreCommand::PutAttendee(attendee));
                SmallVec::new()
            }
            SyncAction::WorkshopGone(id) => {
                tracing::info!(workshop = %id, "Workshop no longer exists on the server");
                state.apply(StoreCommand::EvictWorkshop(id));
                SmallVec::new()
            }
            SyncAction::FetchFailed { query, error } => {
                tracing::warn!(%query, %error, "Fetch failed, next poll retries");
                SmallVec::new()
            }

            SyncAction::Deploy(entity) => {
                Self::request(state, entity, OptimisticAction::Deploy, env)
            }
            SyncAction::Cleanup(entity) => {
                Self::request(state, entity, OptimisticAction::Cleanup, env)
            }
            SyncAction::Delete(entity) => {
                Self::request(state, entity, OptimisticAction::DeleteEntity, env)
            }
            SyncAction::Retry(entity) => Self::request(state, entity, OptimisticAction::Retry, env),

            SyncAction::MutationSucceeded { entity, request_id } => {
                Self::confirm(state, entity, request_id, env)
            }
            SyncAction::MutationFailed {
                entity,
                request_id,
                error,
            } => Self::roll_back(state, entity, request_id, error, env),

            SyncAction::ApplyTransition { entity, to } => Self::transition(state, entity, to, env),
            SyncAction::ClearError(entity) => {
                state.errors.remove(&entity);
                SmallVec::new()
            }

            SyncAction::Connect => Self::connect(state, env),
            SyncAction::Disconnect => Self::disconnect(state),
            SyncAction::Push { generation, event } => {
                if generation != state.channel.generation {
                    tracing::debug!(generation, ?event, "Ignoring event of a superseded connection");
                    return SmallVec::new();
                }
                match event {
                    PushEvent::Opened => Self::on_open(state, env),
                    PushEvent::Message(text) => Self::on_message(state, &text, env),
                    PushEvent::Closed { code, reason } => Self::on_closed(state, code, &reason, env),
                }
            }
            SyncAction::PingTick => {
                if state.channel.phase == ChannelPhase::Open {
                    smallvec![Effect::Push(PushOperation::Send {
                        message: OutboundMessage::Ping,
                    })]
                } else {
                    SmallVec::new()
                }
            }
            SyncAction::ReconnectTick => {
                if state.channel.phase == ChannelPhase::Reconnecting {
                    Self::open(state, env)
                } else {
                    SmallVec::new()
                }
            }
        }
    }
}
