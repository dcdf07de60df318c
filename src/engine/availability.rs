use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::calendar;
use crate::model::*;

// ── Availability Index ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockReason {
    Holiday,
    Maintenance,
    Overlap,
}

impl BlockReason {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockReason::Holiday => "HOLIDAY",
            BlockReason::Maintenance => "MAINTENANCE",
            BlockReason::Overlap => "OVERLAP",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a window was refused, and what refused it: the holiday, the room under
/// maintenance, or the reservation already holding the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub reason: BlockReason,
    pub culprit: Ulid,
}

/// Answer to `check_availability`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityInfo {
    pub free: bool,
    pub reason: Option<BlockReason>,
    pub culprit: Option<Ulid>,
}

impl From<Result<(), Conflict>> for AvailabilityInfo {
    fn from(result: Result<(), Conflict>) -> Self {
        match result {
            Ok(()) => AvailabilityInfo {
                free: true,
                reason: None,
                culprit: None,
            },
            Err(c) => AvailabilityInfo {
                free: false,
                reason: Some(c.reason),
                culprit: Some(c.culprit),
            },
        }
    }
}

/// Date-only match, time of day ignored.
pub fn holiday_on(date: NaiveDate, holidays: &[Holiday]) -> Option<&Holiday> {
    holidays.iter().find(|h| h.date == date)
}

/// Decide whether `span` may be booked on every room in `rooms`.
///
/// Checks run in order and the first failure wins:
/// 1. holiday on the start date,
/// 2. active maintenance on any room (closed window edges),
/// 3. any SCHEDULED/IN_PROGRESS reservation touching a room in the set whose
///    scheduled `[start, end)` overlaps. Completion does not release the nominal
///    window.
///
/// `excluding` skips one reservation so a move never conflicts with itself.
pub fn check<'a>(
    rooms: &[&Room],
    span: &Span,
    holidays: &[Holiday],
    reservations: impl IntoIterator<Item = &'a Reservation>,
    excluding: Option<Ulid>,
) -> Result<(), Conflict> {
    if let Some(h) = holiday_on(span.date(), holidays) {
        return Err(Conflict {
            reason: BlockReason::Holiday,
            culprit: h.id,
        });
    }

    for room in rooms {
        if let Some(window) = room.active_maintenance()
            && window.intersects(span)
        {
            return Err(Conflict {
                reason: BlockReason::Maintenance,
                culprit: room.id,
            });
        }
    }

    let room_ids: Vec<Ulid> = rooms.iter().map(|r| r.id).collect();
    for existing in reservations {
        if Some(existing.id) == excluding || !existing.status.is_active() {
            continue;
        }
        if existing.touches_any(&room_ids) && existing.span.overlaps(span) {
            return Err(Conflict {
                reason: BlockReason::Overlap,
                culprit: existing.id,
            });
        }
    }

    Ok(())
}

/// Reservation shown in `room_id`'s calendar during `slot`, using display
/// occupancy (completed reservations end at their actual end).
pub fn occupant_in<'a>(
    room_id: Ulid,
    slot: &Span,
    reservations: impl IntoIterator<Item = &'a Reservation>,
) -> Option<&'a Reservation> {
    reservations
        .into_iter()
        .find(|r| r.touches(room_id) && r.display_span().is_some_and(|s| s.overlaps(slot)))
}

/// Free stretches of one day's operating window for a room set, built from the
/// slot grid and merged into maximal runs.
pub fn free_windows<'a>(
    rooms: &[&Room],
    date: NaiveDate,
    holidays: &[Holiday],
    reservations: impl IntoIterator<Item = &'a Reservation>,
) -> Vec<Span> {
    if holiday_on(date, holidays).is_some() {
        return Vec::new();
    }
    let reservations: Vec<&Reservation> = reservations.into_iter().collect();
    let free: Vec<Span> = calendar::day_slots(date)
        .filter(|slot| check(rooms, slot, holidays, reservations.iter().copied(), None).is_ok())
        .collect();
    merge_overlapping(&free)
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}
