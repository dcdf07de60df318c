//! Bookable grid: 30-minute slots across a 09:00–19:00 day, Monday-first weeks
//! and month views padded to whole weeks.

use chrono::{Datelike, NaiveDate, NaiveTime, TimeDelta};

use crate::model::{Span, Ts};

pub const OPENING_HOUR: u32 = 9;
pub const CLOSING_HOUR: u32 = 19;
pub const SLOT_MINUTES: i64 = 30;
pub const SLOTS_PER_DAY: usize = 20;

pub fn slot_length() -> TimeDelta {
    TimeDelta::minutes(SLOT_MINUTES)
}

fn at_hour(date: NaiveDate, hour: u32) -> Ts {
    date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN))
}

/// The operating window of one day, `[09:00, 19:00)`.
pub fn operating_window(date: NaiveDate) -> Span {
    Span::new(at_hour(date, OPENING_HOUR), at_hour(date, CLOSING_HOUR))
}

/// Lazy, finite sequence of the day's slots. Clone it to restart.
#[derive(Debug, Clone)]
pub struct DaySlots {
    date: NaiveDate,
    next: usize,
}

impl Iterator for DaySlots {
    type Item = Span;

    fn next(&mut self) -> Option<Span> {
        if self.next >= SLOTS_PER_DAY {
            return None;
        }
        let start = at_hour(self.date, OPENING_HOUR) + slot_length() * self.next as i32;
        self.next += 1;
        Some(Span::new(start, start + slot_length()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = SLOTS_PER_DAY - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for DaySlots {}

pub fn day_slots(date: NaiveDate) -> DaySlots {
    DaySlots { date, next: 0 }
}

/// Monday of the anchor's week. Sunday belongs to the week that began six days earlier.
///
/// Week and month helpers expect dates within `limits::MIN_YEAR..=MAX_YEAR`;
/// the engine rejects anchors outside that range before calling them.
pub fn week_start(anchor: NaiveDate) -> NaiveDate {
    let weekday = anchor.weekday().num_days_from_sunday() as i64;
    let days_to_monday = if weekday == 0 { -6 } else { 1 - weekday };
    anchor + TimeDelta::days(days_to_monday)
}

/// Seven consecutive dates, Monday first.
pub fn week_days(anchor: NaiveDate) -> [NaiveDate; 7] {
    let monday = week_start(anchor);
    std::array::from_fn(|i| monday + TimeDelta::days(i as i64))
}

/// Sunday closing the anchor's week.
pub fn week_end(anchor: NaiveDate) -> NaiveDate {
    let weekday = anchor.weekday().num_days_from_sunday() as i64;
    let days_to_sunday = if weekday == 0 { 0 } else { 7 - weekday };
    anchor + TimeDelta::days(days_to_sunday)
}

fn first_of_month(anchor: NaiveDate) -> NaiveDate {
    anchor.with_day(1).unwrap_or(anchor)
}

fn last_of_month(anchor: NaiveDate) -> NaiveDate {
    let first = first_of_month(anchor);
    let next_first = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    next_first.map_or(first, |d| d - TimeDelta::days(1))
}

/// Whole Monday..Sunday weeks covering the anchor's month.
pub fn month_weeks(anchor: NaiveDate) -> Vec<[NaiveDate; 7]> {
    let start = week_start(first_of_month(anchor));
    let end = week_end(last_of_month(anchor));
    let mut weeks = Vec::with_capacity(6);
    let mut monday = start;
    while monday <= end {
        weeks.push(week_days(monday));
        monday = monday + TimeDelta::days(7);
    }
    weeks
}
