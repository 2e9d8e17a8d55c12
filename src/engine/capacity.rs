use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Admission gate for a new booking. Runs under the slot's write lock so the
/// count cannot change before the insert.
pub(crate) fn check_admission(
    slot: &SlotState,
    booking: &Booking,
    capacity: u32,
) -> Result<(), EngineError> {
    if slot.len() >= capacity as usize {
        return Err(EngineError::CapacityExceeded {
            key: slot.key,
            capacity,
        });
    }
    if slot.holds_email(&booking.email) {
        return Err(EngineError::DuplicateSlot(slot.key));
    }
    Ok(())
}

pub(crate) fn validate_booking(booking: &Booking) -> Result<(), EngineError> {
    if booking.name.is_empty() || booking.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name length"));
    }
    if booking.email.is_empty() || booking.email.len() > MAX_EMAIL_LEN {
        return Err(EngineError::LimitExceeded("email length"));
    }
    if booking.email != normalize_email(&booking.email) {
        return Err(EngineError::LimitExceeded("email not normalized"));
    }
    Ok(())
}
