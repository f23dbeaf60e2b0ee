use chrono::NaiveDate;

use crate::model::*;

use super::EngineError;

/// Today's date in the server's local time zone.
pub fn local_today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Reject inverted intervals. Same-day stays are allowed.
pub(crate) fn validate_interval(stay: &StayInterval) -> Result<(), EngineError> {
    if stay.is_inverted() {
        return Err(EngineError::InvalidInterval {
            check_in: stay.check_in,
            check_out: stay.check_out,
        });
    }
    Ok(())
}

/// Interval checks applied before a stay is stored.
pub(crate) fn validate_stay(stay: &StayInterval) -> Result<(), EngineError> {
    validate_interval(stay)?;
    if stay.nights() > crate::limits::MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

/// First active booking on the room overlapping `stay`, skipping `exclude`.
pub fn find_conflict(
    rs: &RoomState,
    stay: &StayInterval,
    exclude: Option<BookingId>,
) -> Option<BookingId> {
    rs.overlapping(stay)
        .filter(|b| b.is_active() && Some(b.id) != exclude)
        .map(|b| b.id)
        .next()
}

pub(crate) fn check_no_conflict(
    rs: &RoomState,
    stay: &StayInterval,
    exclude: Option<BookingId>,
) -> Result<(), EngineError> {
    match find_conflict(rs, stay, exclude) {
        Some(booking_id) => {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            Err(EngineError::Conflict {
                room_id: rs.id(),
                booking_id,
            })
        }
        None => Ok(()),
    }
}
