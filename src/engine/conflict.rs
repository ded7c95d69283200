use chrono::Datelike;

use crate::limits::*;
use crate::model::{BookingId, DateRange, ResourceLedger};

use super::EngineError;

/// Bounds check for a candidate range. Ordering of checkin vs checkout is
/// validated by the callers (it maps to `InvalidDateRange`); this only
/// guards against absurd inputs.
pub(crate) fn validate_range(range: &DateRange) -> Result<(), EngineError> {
    if range.start.year() < MIN_BOOKING_YEAR || range.end.year() > MAX_BOOKING_YEAR {
        return Err(EngineError::LimitExceeded("date out of range"));
    }
    if range.days() > MAX_BOOKING_DAYS {
        return Err(EngineError::LimitExceeded("booking window too wide"));
    }
    Ok(())
}

/// The conflict rule: a candidate range may not overlap ANY existing
/// reservation on the resource, closed-interval semantics (a shared
/// boundary day conflicts). Per-resource cardinality is low, so this is a
/// deliberate linear scan.
///
/// `exclude` skips the booking being renewed so it is not compared
/// against itself.
pub(crate) fn check_no_reservation_conflict(
    ledger: &ResourceLedger,
    candidate: &DateRange,
    exclude: Option<BookingId>,
) -> Result<(), EngineError> {
    for reservation in ledger.reservations() {
        if exclude == Some(reservation.id) {
            continue;
        }
        if reservation.range.overlaps(candidate) {
            return Err(EngineError::ReservationConflict {
                resource_id: ledger.resource_id,
                window: reservation.range,
            });
        }
    }
    Ok(())
}
