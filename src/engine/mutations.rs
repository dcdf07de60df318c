use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedMutexGuard, oneshot};
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::availability::{self, Conflict};
use super::lifecycle::{self, Action};
use super::reschedule::{self, ProposedChange};
use super::validate::*;
use super::{Engine, EngineError, WalCommand, pairing};

/// Booking request. `connected_room_id`, when present, must be the partner of
/// `room_id`; the reservation then holds both rooms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReservation {
    pub id: Ulid,
    pub room_id: Ulid,
    #[serde(default)]
    pub connected_room_id: Option<Ulid>,
    pub title: String,
    pub start: Ts,
    pub end: Ts,
}

fn refused(conflict: Conflict) -> EngineError {
    metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL, "reason" => conflict.reason.as_str())
        .increment(1);
    debug!("window refused: {} ({})", conflict.reason, conflict.culprit);
    EngineError::Conflict(conflict)
}

fn note_conflict(e: &EngineError) {
    if let EngineError::Conflict(c) = e {
        let _ = refused(*c);
    }
}

impl Engine {
    // ── Reservations ─────────────────────────────────────────

    pub async fn create_reservation(
        &self,
        req: NewReservation,
        actor: &Actor,
    ) -> Result<Reservation, EngineError> {
        let span = checked_span(req.start, req.end)?;
        validate_reservation_span(&span)?;
        validate_title(&req.title)?;

        let keys = [Some(req.id), Some(req.room_id), req.connected_room_id];
        let _guards = self.lock_ids(keys.into_iter().flatten()).await;

        if self.store.get_reservation(&req.id).is_some() {
            return Err(EngineError::AlreadyExists(req.id));
        }
        let room = self
            .store
            .get_room(&req.room_id)
            .ok_or(EngineError::NotFound(req.room_id))?;
        let use_connected = pairing::requested_pairing(&room, req.connected_room_id)?;
        let rooms = pairing::resolve(&room, use_connected, |id| self.store.get_room(&id))?;
        let room_ids: Vec<Ulid> = rooms.iter().map(|r| r.id).collect();
        let room_refs: Vec<&Room> = rooms.iter().collect();

        let holidays = self.store.list_holidays();
        let existing = self.store.reservations_touching(&room_ids);
        availability::check(&room_refs, &span, &holidays, &existing, None).map_err(refused)?;

        let now = self.now();
        let reservation = Reservation {
            id: req.id,
            room_id: room.id,
            connected_room_id: use_connected.then(|| room_ids[1]),
            title: req.title,
            organizer: Organizer {
                id: actor.id,
                name: actor.name.clone(),
            },
            span,
            actual_end: None,
            status: ReservationStatus::Scheduled,
            created_at: now,
            updated_at: now,
        };
        self.persist_and_apply(Event::ReservationCreated {
            reservation: reservation.clone(),
        })
        .await?;
        metrics::counter!(observability::RESERVATIONS_CREATED_TOTAL).increment(1);
        info!(
            "reservation {} booked on {:?} {}..{}",
            reservation.id, room_ids, span.start, span.end
        );
        Ok(reservation)
    }

    /// Validate a drag of `id` to `new_start`. Nothing is written.
    pub async fn propose_move(
        &self,
        id: Ulid,
        new_start: Ts,
        actor: &Actor,
    ) -> Result<ProposedChange, EngineError> {
        let r = self.reload(id)?;
        let rooms = self.rooms_of(&r)?;
        let room_refs: Vec<&Room> = rooms.iter().collect();
        let holidays = self.store.list_holidays();
        let existing = self.store.reservations_touching(&r.room_ids().collect::<Vec<_>>());
        reschedule::propose_move(&r, new_start, actor, &room_refs, &holidays, &existing)
            .inspect_err(note_conflict)
    }

    /// Commit a confirmed proposal. Re-validated against current state.
    pub async fn apply_move(
        &self,
        change: ProposedChange,
        actor: &Actor,
    ) -> Result<Reservation, EngineError> {
        let (r, _guards) = self.lock_reservation(change.reservation_id).await?;
        let rooms = self.rooms_of(&r)?;
        let room_refs: Vec<&Room> = rooms.iter().collect();
        let holidays = self.store.list_holidays();
        let existing = self.store.reservations_touching(&r.room_ids().collect::<Vec<_>>());
        let event = reschedule::confirm_move(
            &r,
            &change,
            actor,
            &room_refs,
            &holidays,
            &existing,
            self.now(),
        )
        .inspect_err(note_conflict)?;
        self.persist_and_apply(event).await?;
        metrics::counter!(observability::MOVES_APPLIED_TOTAL).increment(1);
        info!(
            "reservation {} moved {} -> {}",
            r.id, change.original.start, change.proposed.start
        );
        self.reload(r.id)
    }

    pub async fn transition(
        &self,
        id: Ulid,
        action: Action,
        actor: &Actor,
    ) -> Result<Reservation, EngineError> {
        let (r, _guards) = self.lock_reservation(id).await?;
        let event = lifecycle::transition(&r, action, actor, self.now())?;
        self.persist_and_apply(event).await?;
        metrics::counter!(observability::TRANSITIONS_TOTAL, "action" => action.as_str()).increment(1);
        self.reload(id)
    }

    pub async fn edit_title(
        &self,
        id: Ulid,
        title: String,
        actor: &Actor,
    ) -> Result<Reservation, EngineError> {
        validate_title(&title)?;
        let (r, _guards) = self.lock_reservation(id).await?;
        let event = lifecycle::retitle(&r, title, actor, self.now())?;
        self.persist_and_apply(event).await?;
        self.reload(id)
    }

    pub async fn delete_reservation(&self, id: Ulid, actor: &Actor) -> Result<(), EngineError> {
        let (r, _guards) = self.lock_reservation(id).await?;
        let event = lifecycle::delete(&r, actor)?;
        self.persist_and_apply(event).await?;
        info!("reservation {id} deleted by {}", actor.id);
        Ok(())
    }

    // ── Administration ───────────────────────────────────────

    pub async fn register_room(
        &self,
        id: Ulid,
        name: String,
        capacity: u32,
        actor: &Actor,
    ) -> Result<Room, EngineError> {
        require_admin(actor)?;
        validate_name(&name)?;
        if self.store.room_count() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        let _guards = self.lock_ids([id]).await;
        if self.store.get_room(&id).is_some() {
            return Err(EngineError::AlreadyExists(id));
        }
        let room = Room::new(id, name, capacity);
        self.persist_and_apply(Event::RoomRegistered { room: room.clone() }).await?;
        info!("room {id} registered as {:?}", room.name);
        Ok(room)
    }

    /// Join `a` and `b` into a connected pair. Pairing is symmetric and permanent.
    pub async fn pair_rooms(&self, a: Ulid, b: Ulid, actor: &Actor) -> Result<(Room, Room), EngineError> {
        require_admin(actor)?;
        let _guards = self.lock_ids([a, b]).await;
        let room_a = self.store.get_room(&a).ok_or(EngineError::NotFound(a))?;
        let room_b = self.store.get_room(&b).ok_or(EngineError::NotFound(b))?;
        pairing::check_pairable(&room_a, &room_b)?;
        if room_a.partner() != Some(b) {
            self.persist_and_apply(Event::RoomsPaired { a, b }).await?;
            info!("rooms {a} and {b} paired");
        }
        Ok((self.room(a)?, self.room(b)?))
    }

    /// Replace the room's maintenance window. Both edges block.
    pub async fn set_maintenance(
        &self,
        room_id: Ulid,
        reason: String,
        start: Ts,
        end: Ts,
        actor: &Actor,
    ) -> Result<Room, EngineError> {
        require_admin(actor)?;
        validate_reason(&reason)?;
        validate_instant(start)?;
        validate_instant(end)?;
        if start > end {
            return Err(EngineError::InvalidSpan);
        }
        let _guards = self.lock_ids([room_id]).await;
        self.room(room_id)?;
        let window = MaintenanceWindow { reason, start, end };
        self.persist_and_apply(Event::MaintenanceSet { room_id, window }).await?;
        self.room(room_id)
    }

    pub async fn clear_maintenance(&self, room_id: Ulid, actor: &Actor) -> Result<Room, EngineError> {
        require_admin(actor)?;
        let _guards = self.lock_ids([room_id]).await;
        let room = self.room(room_id)?;
        if room.active_maintenance().is_none() {
            return Ok(room);
        }
        self.persist_and_apply(Event::MaintenanceCleared { room_id }).await?;
        self.room(room_id)
    }

    pub async fn register_holiday(
        &self,
        id: Ulid,
        date: NaiveDate,
        name: String,
        actor: &Actor,
    ) -> Result<Holiday, EngineError> {
        require_admin(actor)?;
        validate_name(&name)?;
        validate_date(date)?;
        if self.store.holiday_count() >= MAX_HOLIDAYS {
            return Err(EngineError::LimitExceeded("too many holidays"));
        }
        let _guards = self.lock_ids([id]).await;
        if self.store.get_holiday(&id).is_some() {
            return Err(EngineError::AlreadyExists(id));
        }
        let holiday = Holiday { id, date, name };
        self.persist_and_apply(Event::HolidayRegistered {
            holiday: holiday.clone(),
        })
        .await?;
        info!("holiday {} on {}", holiday.name, holiday.date);
        Ok(holiday)
    }

    pub async fn remove_holiday(&self, id: Ulid, actor: &Actor) -> Result<(), EngineError> {
        require_admin(actor)?;
        let _guards = self.lock_ids([id]).await;
        if self.store.get_holiday(&id).is_none() {
            return Err(EngineError::NotFound(id));
        }
        self.persist_and_apply(Event::HolidayRemoved { id }).await
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Rewrite the WAL as a snapshot of current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let count = self.compact().await?;
        metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
        info!("WAL compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    // ── Helpers ──────────────────────────────────────────────

    pub(super) fn room(&self, id: Ulid) -> Result<Room, EngineError> {
        self.store.get_room(&id).ok_or(EngineError::NotFound(id))
    }

    pub(super) fn reload(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.store.get_reservation(&id).ok_or(EngineError::NotFound(id))
    }

    /// Rooms a reservation occupies, in `room_ids()` order.
    fn rooms_of(&self, r: &Reservation) -> Result<Vec<Room>, EngineError> {
        r.room_ids().map(|id| self.room(id)).collect()
    }

    /// Guard the reservation's rooms and re-read it under them.
    async fn lock_reservation(
        &self,
        id: Ulid,
    ) -> Result<(Reservation, Vec<OwnedMutexGuard<()>>), EngineError> {
        let r = self.reload(id)?;
        let guards = self.lock_ids(r.room_ids()).await;
        Ok((self.reload(id)?, guards))
    }
}
