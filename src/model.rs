use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Local wall-clock instant. No time zones anywhere.
pub type Ts = NaiveDateTime;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ts,
    pub end: Ts,
}

impl Span {
    pub fn new(start: Ts, end: Ts) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Checked constructor for caller-supplied bounds.
    pub fn try_new(start: Ts, end: Ts) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ts) -> bool {
        self.start <= t && t < self.end
    }

    /// Same length, new start. `None` if the end falls outside chrono's range.
    pub fn shifted_to(&self, start: Ts) -> Option<Span> {
        let end = start.checked_add_signed(self.duration())?;
        Span::try_new(start, end)
    }

    /// Calendar date of the start instant.
    pub fn date(&self) -> NaiveDate {
        self.start.date()
    }
}

// ── Rooms ────────────────────────────────────────────────────────

/// Whether a room stands alone or is one half of a bookable pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomKind {
    Single,
    Connected { partner: Ulid },
}

/// Administrator-declared window. Both edges are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub reason: String,
    pub start: Ts,
    pub end: Ts,
}

impl MaintenanceWindow {
    /// Closed `[start, end]` against half-open `[span.start, span.end)`.
    pub fn intersects(&self, span: &Span) -> bool {
        self.start < span.end && span.start <= self.end
    }

    pub fn covers(&self, t: Ts) -> bool {
        self.start <= t && t <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaintenanceState {
    Inactive,
    Active(MaintenanceWindow),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub name: String,
    pub capacity: u32,
    pub kind: RoomKind,
    pub maintenance: MaintenanceState,
}

impl Room {
    pub fn new(id: Ulid, name: String, capacity: u32) -> Self {
        Self {
            id,
            name,
            capacity,
            kind: RoomKind::Single,
            maintenance: MaintenanceState::Inactive,
        }
    }

    pub fn partner(&self) -> Option<Ulid> {
        match self.kind {
            RoomKind::Connected { partner } => Some(partner),
            RoomKind::Single => None,
        }
    }

    pub fn active_maintenance(&self) -> Option<&MaintenanceWindow> {
        match &self.maintenance {
            MaintenanceState::Active(window) => Some(window),
            MaintenanceState::Inactive => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub id: Ulid,
    pub date: NaiveDate,
    pub name: String,
}

// ── Actors ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    User,
}

/// Identity on whose behalf a mutation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Ulid,
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Organizers and administrators may mutate a reservation.
    pub fn may_mutate(&self, reservation: &Reservation) -> bool {
        self.is_admin() || self.id == reservation.organizer.id
    }
}

// ── Reservations ─────────────────────────────────────────────────

/// Weak reference to the user who made the booking; never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organizer {
    pub id: Ulid,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    /// Statuses that hold capacity for conflict purposes.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Scheduled | Self::InProgress)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub room_id: Ulid,
    /// Set only when booked as a merged pair.
    pub connected_room_id: Option<Ulid>,
    pub title: String,
    pub organizer: Organizer,
    /// Scheduled window.
    pub span: Span,
    /// Set on completion; may fall before or after `span.end`.
    pub actual_end: Option<Ts>,
    pub status: ReservationStatus,
    pub created_at: Ts,
    pub updated_at: Ts,
}

impl Reservation {
    /// Rooms this reservation occupies.
    pub fn room_ids(&self) -> impl Iterator<Item = Ulid> + '_ {
        std::iter::once(self.room_id).chain(self.connected_room_id)
    }

    pub fn touches(&self, room_id: Ulid) -> bool {
        self.room_id == room_id || self.connected_room_id == Some(room_id)
    }

    pub fn touches_any(&self, room_ids: &[Ulid]) -> bool {
        room_ids.iter().any(|r| self.touches(*r))
    }

    /// Window shown on the calendar. Completed reservations shrink (or grow) to
    /// their actual end; cancelled ones show nothing.
    pub fn display_span(&self) -> Option<Span> {
        match (self.status, self.actual_end) {
            (ReservationStatus::Cancelled, _) => None,
            (ReservationStatus::Completed, Some(actual_end)) => {
                Span::try_new(self.span.start, actual_end)
            }
            _ => Some(self.span),
        }
    }
}

/// Read-side selection over reservations. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationFilter {
    #[serde(default)]
    pub room_id: Option<Ulid>,
    #[serde(default)]
    pub window: Option<Span>,
    #[serde(default)]
    pub status: Option<ReservationStatus>,
    #[serde(default)]
    pub organizer_id: Option<Ulid>,
}

impl ReservationFilter {
    pub fn matches(&self, r: &Reservation) -> bool {
        self.room_id.is_none_or(|room| r.touches(room))
            && self.window.is_none_or(|w| w.overlaps(&r.span))
            && self.status.is_none_or(|s| r.status == s)
            && self.organizer_id.is_none_or(|o| r.organizer.id == o)
    }
}

// ── Query result types ───────────────────────────────────────────

/// What one calendar slot shows, highest priority first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellState {
    Holiday {
        name: String,
    },
    Maintenance {
        reason: String,
    },
    Reserved {
        reservation_id: Ulid,
        title: String,
        organizer_name: String,
        status: ReservationStatus,
        /// First slot of the reservation; later slots render as continuation.
        starts_here: bool,
    },
    Free,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCell {
    pub span: Span,
    pub state: CellState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayColumn {
    pub date: NaiveDate,
    pub holiday: Option<String>,
    pub slots: Vec<SlotCell>,
}

/// Monday-to-Sunday slot grid for one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekGrid {
    pub room_id: Ulid,
    pub week_start: NaiveDate,
    pub days: Vec<DayColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthDay {
    pub date: NaiveDate,
    pub in_month: bool,
    pub holiday: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    pub weeks: Vec<Vec<MonthDay>>,
}

/// Every state change, flat. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomRegistered {
        room: Room,
    },
    RoomsPaired {
        a: Ulid,
        b: Ulid,
    },
    MaintenanceSet {
        room_id: Ulid,
        window: MaintenanceWindow,
    },
    MaintenanceCleared {
        room_id: Ulid,
    },
    HolidayRegistered {
        holiday: Holiday,
    },
    HolidayRemoved {
        id: Ulid,
    },
    ReservationCreated {
        reservation: Reservation,
    },
    ReservationRetitled {
        id: Ulid,
        title: String,
        at: Ts,
    },
    ReservationMoved {
        id: Ulid,
        span: Span,
        at: Ts,
    },
    ReservationStarted {
        id: Ulid,
        at: Ts,
    },
    ReservationCompleted {
        id: Ulid,
        at: Ts,
    },
    ReservationCancelled {
        id: Ulid,
        at: Ts,
    },
    ReservationDeleted {
        id: Ulid,
    },
}

impl Event {
    /// Short label for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Event::RoomRegistered { .. } => "room_registered",
            Event::RoomsPaired { .. } => "rooms_paired",
            Event::MaintenanceSet { .. } => "maintenance_set",
            Event::MaintenanceCleared { .. } => "maintenance_cleared",
            Event::HolidayRegistered { .. } => "holiday_registered",
            Event::HolidayRemoved { .. } => "holiday_removed",
            Event::ReservationCreated { .. } => "reservation_created",
            Event::ReservationRetitled { .. } => "reservation_retitled",
            Event::ReservationMoved { .. } => "reservation_moved",
            Event::ReservationStarted { .. } => "reservation_started",
            Event::ReservationCompleted { .. } => "reservation_completed",
            Event::ReservationCancelled { .. } => "reservation_cancelled",
            Event::ReservationDeleted { .. } => "reservation_deleted",
        }
    }
}
