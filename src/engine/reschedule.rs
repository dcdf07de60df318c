use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::model::*;

use super::availability;
use super::validate::checked_span;
use super::EngineError;

/// A validated, not yet applied, move. Must be confirmed with `apply_move`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedChange {
    pub reservation_id: Ulid,
    pub original: Span,
    pub proposed: Span,
}

/// Validate moving `r` to start at `new_start`, keeping its duration.
///
/// `rooms` are the rooms the reservation occupies; the new window is checked
/// against them with the reservation itself excluded.
pub fn propose_move<'a>(
    r: &Reservation,
    new_start: Ts,
    actor: &Actor,
    rooms: &[&Room],
    holidays: &[Holiday],
    reservations: impl IntoIterator<Item = &'a Reservation>,
) -> Result<ProposedChange, EngineError> {
    if r.status != ReservationStatus::Scheduled {
        return Err(EngineError::InvalidTransition {
            id: r.id,
            status: r.status,
            action: "move",
        });
    }
    if !actor.may_mutate(r) {
        return Err(EngineError::PermissionDenied(actor.id));
    }
    let proposed = r.span.shifted_to(new_start).ok_or(EngineError::InvalidSpan)?;
    checked_span(proposed.start, proposed.end)?;
    availability::check(rooms, &proposed, holidays, reservations, Some(r.id))
        .map_err(EngineError::Conflict)?;
    Ok(ProposedChange {
        reservation_id: r.id,
        original: r.span,
        proposed,
    })
}

/// Re-validate a confirmed proposal against current state and produce the move event.
/// Status is left untouched.
pub fn confirm_move<'a>(
    r: &Reservation,
    change: &ProposedChange,
    actor: &Actor,
    rooms: &[&Room],
    holidays: &[Holiday],
    reservations: impl IntoIterator<Item = &'a Reservation>,
    now: Ts,
) -> Result<Event, EngineError> {
    if r.id != change.reservation_id || r.span != change.original {
        return Err(EngineError::Stale(r.id));
    }
    let fresh = propose_move(r, change.proposed.start, actor, rooms, holidays, reservations)?;
    if fresh.proposed != change.proposed {
        return Err(EngineError::Stale(r.id));
    }
    Ok(Event::ReservationMoved {
        id: r.id,
        span: fresh.proposed,
        at: now,
    })
}
