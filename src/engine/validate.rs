use chrono::{Datelike, NaiveDate};

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Keeps dates far enough from chrono's bounds that week and slot arithmetic cannot overflow.
pub(crate) fn validate_date(date: NaiveDate) -> Result<(), EngineError> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&date.year()) {
        return Err(EngineError::LimitExceeded("date out of range"));
    }
    Ok(())
}

pub(crate) fn validate_instant(t: Ts) -> Result<(), EngineError> {
    validate_date(t.date())
}

pub(crate) fn checked_span(start: Ts, end: Ts) -> Result<Span, EngineError> {
    validate_instant(start)?;
    validate_instant(end)?;
    Span::try_new(start, end).ok_or(EngineError::InvalidSpan)
}

pub(crate) fn validate_reservation_span(span: &Span) -> Result<(), EngineError> {
    if span.duration() > max_reservation_length() {
        return Err(EngineError::LimitExceeded("reservation too long"));
    }
    Ok(())
}

pub(crate) fn validate_query_span(span: &Span) -> Result<(), EngineError> {
    validate_instant(span.start)?;
    validate_instant(span.end)?;
    if span.duration() > max_query_window() {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

pub(crate) fn validate_title(title: &str) -> Result<(), EngineError> {
    if title.trim().is_empty() {
        return Err(EngineError::LimitExceeded("title must not be empty"));
    }
    if title.len() > MAX_TITLE_LEN {
        return Err(EngineError::LimitExceeded("title too long"));
    }
    Ok(())
}

pub(crate) fn validate_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::LimitExceeded("name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

pub(crate) fn validate_reason(reason: &str) -> Result<(), EngineError> {
    if reason.len() > MAX_REASON_LEN {
        return Err(EngineError::LimitExceeded("maintenance reason too long"));
    }
    Ok(())
}

pub(crate) fn require_admin(actor: &Actor) -> Result<(), EngineError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(EngineError::PermissionDenied(actor.id))
    }
}
