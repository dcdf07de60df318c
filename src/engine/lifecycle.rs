use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::model::*;

use super::EngineError;

/// How early before its scheduled start a reservation may be started.
pub fn early_start_allowance() -> TimeDelta {
    TimeDelta::hours(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Start,
    End,
    Cancel,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::End => "end",
            Action::Cancel => "cancel",
        }
    }
}

/// `[start - 1h, end)`: when a SCHEDULED reservation may be started.
/// Opens at chrono's earliest instant if `start - 1h` would underflow.
pub fn start_window(r: &Reservation) -> Span {
    let opens = r
        .span
        .start
        .checked_sub_signed(early_start_allowance())
        .unwrap_or(Ts::MIN);
    Span::new(opens, r.span.end)
}

pub fn can_start(r: &Reservation, now: Ts) -> bool {
    r.status == ReservationStatus::Scheduled && start_window(r).contains_instant(now)
}

fn refuse(r: &Reservation, action: &'static str) -> EngineError {
    EngineError::InvalidTransition {
        id: r.id,
        status: r.status,
        action,
    }
}

fn authorize(r: &Reservation, actor: &Actor) -> Result<(), EngineError> {
    if actor.may_mutate(r) {
        Ok(())
    } else {
        Err(EngineError::PermissionDenied(actor.id))
    }
}

/// Validate a status transition and produce the event that performs it.
///
/// ```text
/// SCHEDULED ──start──▶ IN_PROGRESS ──end──▶ COMPLETED
///     │                     │
///     └───────cancel────────┴──────────────▶ CANCELLED
/// ```
pub fn transition(r: &Reservation, action: Action, actor: &Actor, now: Ts) -> Result<Event, EngineError> {
    authorize(r, actor)?;
    match action {
        Action::Start => {
            if !can_start(r, now) {
                return Err(refuse(r, "start"));
            }
            Ok(Event::ReservationStarted { id: r.id, at: now })
        }
        Action::End => {
            if r.status != ReservationStatus::InProgress {
                return Err(refuse(r, "end"));
            }
            Ok(Event::ReservationCompleted { id: r.id, at: now })
        }
        Action::Cancel => {
            if !r.status.is_active() {
                return Err(refuse(r, "cancel"));
            }
            Ok(Event::ReservationCancelled { id: r.id, at: now })
        }
    }
}

/// Title edits are allowed until the reservation reaches a terminal state.
pub fn retitle(r: &Reservation, title: String, actor: &Actor, now: Ts) -> Result<Event, EngineError> {
    authorize(r, actor)?;
    if r.status.is_terminal() {
        return Err(refuse(r, "edit"));
    }
    Ok(Event::ReservationRetitled { id: r.id, title, at: now })
}

pub fn delete(r: &Reservation, actor: &Actor) -> Result<Event, EngineError> {
    authorize(r, actor)?;
    if !r.status.is_active() {
        return Err(refuse(r, "delete"));
    }
    Ok(Event::ReservationDeleted { id: r.id })
}

/// Apply a reservation-scoped event. Deletion is handled by the store.
pub fn apply(r: &mut Reservation, event: &Event) {
    match event {
        Event::ReservationRetitled { title, at, .. } => {
            r.title = title.clone();
            r.updated_at = *at;
        }
        Event::ReservationMoved { span, at, .. } => {
            r.span = *span;
            r.updated_at = *at;
        }
        Event::ReservationStarted { at, .. } => {
            r.status = ReservationStatus::InProgress;
            r.updated_at = *at;
        }
        Event::ReservationCompleted { at, .. } => {
            r.status = ReservationStatus::Completed;
            r.actual_end = Some(*at);
            r.updated_at = *at;
        }
        Event::ReservationCancelled { at, .. } => {
            r.status = ReservationStatus::Cancelled;
            r.updated_at = *at;
        }
        _ => {}
    }
}
