use chrono::TimeDelta;

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_HOLIDAYS: usize = 10_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_TITLE_LEN: usize = 512;
pub const MAX_REASON_LEN: usize = 1024;
/// Longest single reservation.
pub const MAX_RESERVATION_DAYS: i64 = 31;
/// Widest window a listing or availability query may cover.
pub const MAX_QUERY_DAYS: i64 = 366;
/// Calendar years accepted for any caller-supplied date or instant.
pub const MIN_YEAR: i32 = 1;
pub const MAX_YEAR: i32 = 9999;
/// Longest request line accepted on the wire.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

pub fn max_reservation_length() -> TimeDelta {
    TimeDelta::days(MAX_RESERVATION_DAYS)
}

pub fn max_query_window() -> TimeDelta {
    TimeDelta::days(MAX_QUERY_DAYS)
}
