use ulid::Ulid;

use crate::model::ReservationStatus;

use super::availability::Conflict;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The window is taken; nothing was written.
    Conflict(Conflict),
    InvalidPairing(Ulid),
    /// Actor lacks organizer/admin rights.
    PermissionDenied(Ulid),
    InvalidTransition {
        id: Ulid,
        status: ReservationStatus,
        action: &'static str,
    },
    /// A proposed move no longer matches the reservation it was made for.
    Stale(Ulid),
    InvalidSpan,
    LimitExceeded(&'static str),
    /// Persistence failed. The only non-recoverable error.
    Storage(String),
}

impl EngineError {
    /// Stable machine-readable tag.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::Conflict(_) => "conflict",
            EngineError::InvalidPairing(_) => "invalid_pairing",
            EngineError::PermissionDenied(_) => "permission_denied",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::Stale(_) => "stale",
            EngineError::InvalidSpan => "invalid_span",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::Storage(_) => "storage",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Storage(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Conflict(c) => {
                write!(f, "window unavailable ({}): blocked by {}", c.reason, c.culprit)
            }
            EngineError::InvalidPairing(id) => {
                write!(f, "room {id} has no connected counterpart to book with")
            }
            EngineError::PermissionDenied(actor) => {
                write!(f, "actor {actor} may not perform this change")
            }
            EngineError::InvalidTransition { id, status, action } => {
                write!(f, "cannot {action} reservation {id} while {status}")
            }
            EngineError::Stale(id) => {
                write!(f, "reservation {id} changed since the move was proposed")
            }
            EngineError::InvalidSpan => write!(f, "start must be before end"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
