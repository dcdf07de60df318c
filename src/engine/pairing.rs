use ulid::Ulid;

use crate::model::*;

use super::EngineError;

/// Map the optional `connected_room_id` of a request onto the "use connected" flag.
/// A supplied id must name the room's configured partner.
pub fn requested_pairing(room: &Room, connected_room_id: Option<Ulid>) -> Result<bool, EngineError> {
    match connected_room_id {
        None => Ok(false),
        Some(c) if room.partner() == Some(c) => Ok(true),
        Some(_) => Err(EngineError::InvalidPairing(room.id)),
    }
}

/// Expand a booking request into the rooms that must be checked and held together.
///
/// Unpaired requests, and any request on a SINGLE room, affect only `room`.
/// A paired request on a CONNECTED room adds its partner, which must exist and
/// point back at `room`.
pub fn resolve(
    room: &Room,
    use_connected: bool,
    lookup: impl FnOnce(Ulid) -> Option<Room>,
) -> Result<Vec<Room>, EngineError> {
    if !use_connected {
        return Ok(vec![room.clone()]);
    }
    let partner_id = room.partner().ok_or(EngineError::InvalidPairing(room.id))?;
    let partner = lookup(partner_id).ok_or(EngineError::InvalidPairing(room.id))?;
    if partner.partner() != Some(room.id) {
        return Err(EngineError::InvalidPairing(room.id));
    }
    Ok(vec![room.clone(), partner])
}

/// Validate joining `a` and `b` into a pair. Re-pairing the same two rooms is allowed.
pub fn check_pairable(a: &Room, b: &Room) -> Result<(), EngineError> {
    if a.id == b.id {
        return Err(EngineError::InvalidPairing(a.id));
    }
    for (room, other) in [(a, b), (b, a)] {
        if let Some(p) = room.partner()
            && p != other.id
        {
            return Err(EngineError::InvalidPairing(room.id));
        }
    }
    Ok(())
}

/// Ids in lock order.
pub fn lock_order(room_ids: impl IntoIterator<Item = Ulid>) -> Vec<Ulid> {
    let mut ids: Vec<Ulid> = room_ids.into_iter().collect();
    ids.sort();
    ids.dedup();
    ids
}
