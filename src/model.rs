use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::catalog::ResourceMeta;

pub type BookingId = Ulid;
pub type ResourceId = Ulid;
pub type PatronId = Ulid;

/// Closed calendar-date interval `[start, end]`. No time-of-day anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Number of calendar days covered, endpoints included.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Closed-interval overlap: sharing a single boundary day counts.
    /// Total over all inputs, well-formed or not.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// The two booking kinds. The only legal transition is Reserve -> Borrow,
/// performed by the promotion sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingKind {
    /// Active loan, in effect now.
    Borrow,
    /// Future-dated claim, not yet in effect.
    Reserve,
}

/// The authenticated patron identity a caller passes into every mutation.
/// The core never reads ambient session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatronRef {
    pub id: PatronId,
    pub name: String,
}

/// One claim on one resource over one date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub resource_id: ResourceId,
    pub patron_id: PatronId,
    pub patron_name: String,
    pub kind: BookingKind,
    pub range: DateRange,
}

impl Booking {
    pub fn checkin_date(&self) -> NaiveDate {
        self.range.start
    }

    pub fn checkout_date(&self) -> NaiveDate {
        self.range.end
    }
}

/// All bookings for one resource, sorted by `range.start`.
#[derive(Debug, Clone)]
pub struct ResourceLedger {
    pub resource_id: ResourceId,
    pub bookings: Vec<Booking>,
}

impl ResourceLedger {
    pub fn new(resource_id: ResourceId) -> Self {
        Self {
            resource_id,
            bookings: Vec::new(),
        }
    }

    /// Insert a booking maintaining sort order by checkin date.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.range.start, |b| b.range.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    /// Remove a booking by id.
    pub fn remove_booking(&mut self, id: BookingId) -> Option<Booking> {
        if let Some(pos) = self.bookings.iter().position(|b| b.id == id) {
            Some(self.bookings.remove(pos))
        } else {
            None
        }
    }

    pub fn booking(&self, id: BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: BookingId) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// The active loan, if any. Under normal operation there is at most one.
    pub fn active_borrow(&self) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.kind == BookingKind::Borrow)
    }

    pub fn reservations(&self) -> impl Iterator<Item = &Booking> {
        self.bookings
            .iter()
            .filter(|b| b.kind == BookingKind::Reserve)
    }
}

/// The journal record format: flat variants, no nesting. Each carries
/// `resource_id` so replay can route it to the right ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingCreated {
        id: BookingId,
        resource_id: ResourceId,
        patron_id: PatronId,
        patron_name: String,
        kind: BookingKind,
        checkin: NaiveDate,
        checkout: NaiveDate,
    },
    BookingRenewed {
        id: BookingId,
        resource_id: ResourceId,
        checkout: NaiveDate,
    },
    BookingPromoted {
        id: BookingId,
        resource_id: ResourceId,
    },
    BookingReturned {
        id: BookingId,
        resource_id: ResourceId,
    },
}

impl Event {
    pub fn resource_id(&self) -> ResourceId {
        match self {
            Event::BookingCreated { resource_id, .. }
            | Event::BookingRenewed { resource_id, .. }
            | Event::BookingPromoted { resource_id, .. }
            | Event::BookingReturned { resource_id, .. } => *resource_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// A booking joined with its catalog record, for history and desk views.
/// `resource` is None when the catalog no longer knows the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingDetails {
    pub booking: Booking,
    pub resource: Option<ResourceMeta>,
}
