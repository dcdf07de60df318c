use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

use super::lifecycle;

/// Persistence collaborator. Reads hand out owned copies; every write is an [`Event`].
pub trait Store: Send + Sync {
    fn list_rooms(&self) -> Vec<Room>;
    fn get_room(&self, id: &Ulid) -> Option<Room>;
    fn room_count(&self) -> usize;

    fn list_holidays(&self) -> Vec<Holiday>;
    fn get_holiday(&self, id: &Ulid) -> Option<Holiday>;
    fn holiday_count(&self) -> usize;

    fn list_reservations(&self, filter: &ReservationFilter) -> Vec<Reservation>;
    fn get_reservation(&self, id: &Ulid) -> Option<Reservation>;
    /// Reservations whose `room_id` or `connected_room_id` is in `room_ids`, any status.
    fn reservations_touching(&self, room_ids: &[Ulid]) -> Vec<Reservation>;

    fn apply(&self, event: &Event);
    /// Minimal event sequence that recreates the current state.
    fn snapshot(&self) -> Vec<Event>;
}

pub struct InMemoryStore {
    rooms: DashMap<Ulid, Room>,
    holidays: DashMap<Ulid, Holiday>,
    reservations: DashMap<Ulid, Reservation>,
    /// Room → reservations holding it, via either room field.
    by_room: DashMap<Ulid, Vec<Ulid>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            holidays: DashMap::new(),
            reservations: DashMap::new(),
            by_room: DashMap::new(),
        }
    }

    // ── Room index ───────────────────────────────────────────

    fn index(&self, r: &Reservation) {
        for room_id in r.room_ids() {
            self.by_room.entry(room_id).or_default().push(r.id);
        }
    }

    fn unindex(&self, r: &Reservation) {
        for room_id in r.room_ids() {
            if let Some(mut ids) = self.by_room.get_mut(&room_id) {
                ids.retain(|id| *id != r.id);
            }
        }
    }

    fn set_kind(&self, room_id: Ulid, kind: RoomKind) {
        if let Some(mut room) = self.rooms.get_mut(&room_id) {
            room.kind = kind;
        }
    }

    fn set_maintenance(&self, room_id: Ulid, state: MaintenanceState) {
        if let Some(mut room) = self.rooms.get_mut(&room_id) {
            room.maintenance = state;
        }
    }
}

impl Store for InMemoryStore {
    fn list_rooms(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.rooms.iter().map(|e| e.value().clone()).collect();
        rooms.sort_by_key(|r| r.id);
        rooms
    }

    fn get_room(&self, id: &Ulid) -> Option<Room> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn list_holidays(&self) -> Vec<Holiday> {
        let mut holidays: Vec<Holiday> = self.holidays.iter().map(|e| e.value().clone()).collect();
        holidays.sort_by_key(|h| (h.date, h.id));
        holidays
    }

    fn get_holiday(&self, id: &Ulid) -> Option<Holiday> {
        self.holidays.get(id).map(|e| e.value().clone())
    }

    fn holiday_count(&self) -> usize {
        self.holidays.len()
    }

    fn list_reservations(&self, filter: &ReservationFilter) -> Vec<Reservation> {
        let mut out: Vec<Reservation> = match filter.room_id {
            Some(room_id) => self.reservations_touching(&[room_id]),
            None => self.reservations.iter().map(|e| e.value().clone()).collect(),
        };
        out.retain(|r| filter.matches(r));
        out.sort_by_key(|r| (r.span.start, r.id));
        out
    }

    fn get_reservation(&self, id: &Ulid) -> Option<Reservation> {
        self.reservations.get(id).map(|e| e.value().clone())
    }

    fn reservations_touching(&self, room_ids: &[Ulid]) -> Vec<Reservation> {
        let mut ids: Vec<Ulid> = room_ids
            .iter()
            .filter_map(|room_id| self.by_room.get(room_id).map(|e| e.value().clone()))
            .flatten()
            .collect();
        ids.sort();
        ids.dedup();
        ids.iter().filter_map(|id| self.get_reservation(id)).collect()
    }

    fn apply(&self, event: &Event) {
        match event {
            Event::RoomRegistered { room } => {
                self.rooms.insert(room.id, room.clone());
            }
            Event::RoomsPaired { a, b } => {
                self.set_kind(*a, RoomKind::Connected { partner: *b });
                self.set_kind(*b, RoomKind::Connected { partner: *a });
            }
            Event::MaintenanceSet { room_id, window } => {
                self.set_maintenance(*room_id, MaintenanceState::Active(window.clone()));
            }
            Event::MaintenanceCleared { room_id } => {
                self.set_maintenance(*room_id, MaintenanceState::Inactive);
            }
            Event::HolidayRegistered { holiday } => {
                self.holidays.insert(holiday.id, holiday.clone());
            }
            Event::HolidayRemoved { id } => {
                self.holidays.remove(id);
            }
            Event::ReservationCreated { reservation } => {
                if let Some(previous) = self.reservations.insert(reservation.id, reservation.clone()) {
                    self.unindex(&previous);
                }
                self.index(reservation);
            }
            Event::ReservationDeleted { id } => {
                if let Some((_, removed)) = self.reservations.remove(id) {
                    self.unindex(&removed);
                }
            }
            Event::ReservationRetitled { id, .. }
            | Event::ReservationMoved { id, .. }
            | Event::ReservationStarted { id, .. }
            | Event::ReservationCompleted { id, .. }
            | Event::ReservationCancelled { id, .. } => {
                if let Some(mut r) = self.reservations.get_mut(id) {
                    lifecycle::apply(&mut r, event);
                }
            }
        }
    }

    fn snapshot(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .list_rooms()
            .into_iter()
            .map(|room| Event::RoomRegistered { room })
            .collect();
        events.extend(
            self.list_holidays()
                .into_iter()
                .map(|holiday| Event::HolidayRegistered { holiday }),
        );
        events.extend(
            self.list_reservations(&ReservationFilter::default())
                .into_iter()
                .map(|reservation| Event::ReservationCreated { reservation }),
        );
        events
    }
}
