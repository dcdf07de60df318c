use chrono::{Datelike, NaiveDate};
use ulid::Ulid;

use crate::calendar;
use crate::model::*;

use super::availability::{self, AvailabilityInfo};
use super::validate::*;
use super::{Engine, EngineError, pairing};

fn cell_state(room: &Room, slot: &Span, holiday: Option<&str>, reservations: &[Reservation]) -> CellState {
    if let Some(name) = holiday {
        return CellState::Holiday { name: name.to_string() };
    }
    if let Some(window) = room.active_maintenance()
        && window.covers(slot.start)
    {
        return CellState::Maintenance {
            reason: window.reason.clone(),
        };
    }
    match availability::occupant_in(room.id, slot, reservations) {
        Some(r) => CellState::Reserved {
            reservation_id: r.id,
            title: r.title.clone(),
            organizer_name: r.organizer.name.clone(),
            status: r.status,
            starts_here: r.span.start >= slot.start,
        },
        None => CellState::Free,
    }
}

impl Engine {
    pub fn list_rooms(&self) -> Vec<Room> {
        self.store.list_rooms()
    }

    pub fn get_room(&self, id: Ulid) -> Result<Room, EngineError> {
        self.room(id)
    }

    pub fn list_holidays(&self) -> Vec<Holiday> {
        self.store.list_holidays()
    }

    pub fn list_reservations(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, EngineError> {
        if let Some(window) = &filter.window {
            validate_query_span(window)?;
        }
        Ok(self.store.list_reservations(filter))
    }

    pub fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.reload(id)
    }

    /// Would `[start, end)` be bookable right now? Conflicts are answers here, not errors.
    pub fn check_availability(
        &self,
        room_id: Ulid,
        connected_room_id: Option<Ulid>,
        start: Ts,
        end: Ts,
        excluding: Option<Ulid>,
    ) -> Result<AvailabilityInfo, EngineError> {
        let span = checked_span(start, end)?;
        validate_reservation_span(&span)?;
        let rooms = self.affected_rooms(room_id, connected_room_id)?;
        let room_ids: Vec<Ulid> = rooms.iter().map(|r| r.id).collect();
        let room_refs: Vec<&Room> = rooms.iter().collect();
        let holidays = self.store.list_holidays();
        let existing = self.store.reservations_touching(&room_ids);
        Ok(availability::check(&room_refs, &span, &holidays, &existing, excluding).into())
    }

    pub fn week_grid(&self, room_id: Ulid, anchor: NaiveDate) -> Result<WeekGrid, EngineError> {
        validate_date(anchor)?;
        let room = self.room(room_id)?;
        let holidays = self.store.list_holidays();
        let reservations = self.store.reservations_touching(&[room_id]);

        let days = calendar::week_days(anchor)
            .into_iter()
            .map(|date| {
                let holiday = availability::holiday_on(date, &holidays).map(|h| h.name.clone());
                let slots = calendar::day_slots(date)
                    .map(|span| SlotCell {
                        state: cell_state(&room, &span, holiday.as_deref(), &reservations),
                        span,
                    })
                    .collect();
                DayColumn { date, holiday, slots }
            })
            .collect();

        Ok(WeekGrid {
            room_id,
            week_start: calendar::week_start(anchor),
            days,
        })
    }

    pub fn month_grid(&self, anchor: NaiveDate) -> Result<MonthGrid, EngineError> {
        validate_date(anchor)?;
        let holidays = self.store.list_holidays();
        let weeks = calendar::month_weeks(anchor)
            .into_iter()
            .map(|week| {
                week.into_iter()
                    .map(|date| MonthDay {
                        date,
                        in_month: date.month() == anchor.month() && date.year() == anchor.year(),
                        holiday: availability::holiday_on(date, &holidays).map(|h| h.name.clone()),
                    })
                    .collect()
            })
            .collect();
        Ok(MonthGrid {
            year: anchor.year(),
            month: anchor.month(),
            weeks,
        })
    }

    /// Bookable stretches of `date`'s operating window for the room set.
    pub fn free_windows(
        &self,
        room_id: Ulid,
        use_connected: bool,
        date: NaiveDate,
    ) -> Result<Vec<Span>, EngineError> {
        validate_date(date)?;
        let room = self.room(room_id)?;
        let rooms = pairing::resolve(&room, use_connected, |id| self.store.get_room(&id))?;
        let room_ids: Vec<Ulid> = rooms.iter().map(|r| r.id).collect();
        let room_refs: Vec<&Room> = rooms.iter().collect();
        let holidays = self.store.list_holidays();
        let existing = self.store.reservations_touching(&room_ids);
        Ok(availability::free_windows(&room_refs, date, &holidays, &existing))
    }

    fn affected_rooms(&self, room_id: Ulid, connected_room_id: Option<Ulid>) -> Result<Vec<Room>, EngineError> {
        let room = self.room(room_id)?;
        let use_connected = pairing::requested_pairing(&room, connected_room_id)?;
        pairing::resolve(&room, use_connected, |id| self.store.get_room(&id))
    }
}
