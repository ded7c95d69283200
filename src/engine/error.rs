use ulid::Ulid;

use crate::model::{DateRange, ResourceId};
use chrono::NaiveDate;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed or semantically wrong dates: checkin after checkout,
    /// borrow not dated today, reservation dated in the past.
    InvalidDateRange(&'static str),
    /// Resource already has an active loan.
    ResourceUnavailable(ResourceId),
    /// Candidate range overlaps an existing reservation; carries the
    /// conflicting window for display.
    ReservationConflict {
        resource_id: ResourceId,
        window: DateRange,
    },
    /// Booking or resource id does not exist.
    NotFound(Ulid),
    /// Renewal tried to move checkout backwards.
    InvalidRenewal {
        current: NaiveDate,
        requested: NaiveDate,
    },
    /// Conditional Reserve -> Borrow update found a non-Reserve record.
    NotPromotable(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidDateRange(msg) => write!(f, "invalid date range: {msg}"),
            EngineError::ResourceUnavailable(id) => {
                write!(f, "resource {id} is already borrowed")
            }
            EngineError::ReservationConflict {
                resource_id,
                window,
            } => {
                write!(f, "resource {resource_id} already reserved {window}")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::InvalidRenewal { current, requested } => {
                write!(
                    f,
                    "renewal may not move checkout backwards: {requested} is before {current}"
                )
            }
            EngineError::NotPromotable(id) => {
                write!(f, "booking {id} is not in reserved state")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
