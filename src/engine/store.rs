use dashmap::DashMap;

use crate::model::*;

use super::SharedLedger;

/// Shared mutable booking state: one ledger per resource behind its own
/// lock, plus the lookup indexes. The single `apply_event` keeps the
/// indexes and the ledger consistent for both live writes and replay.
pub struct BookingStore {
    ledgers: DashMap<ResourceId, SharedLedger>,
    /// Reverse lookup: booking id -> resource id.
    booking_to_resource: DashMap<BookingId, ResourceId>,
    /// Patron -> booking ids, for history queries.
    patron_bookings: DashMap<PatronId, Vec<BookingId>>,
}

impl Default for BookingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingStore {
    pub fn new() -> Self {
        Self {
            ledgers: DashMap::new(),
            booking_to_resource: DashMap::new(),
            patron_bookings: DashMap::new(),
        }
    }

    // ── Ledger access ────────────────────────────────────────

    pub fn ledger(&self, resource_id: &ResourceId) -> Option<SharedLedger> {
        self.ledgers.get(resource_id).map(|e| e.value().clone())
    }

    /// Ledger for a resource, creating an empty one on first booking.
    /// Concurrent callers for the same resource get the same `Arc`, so the
    /// write lock behind it is the per-resource critical section.
    pub fn ledger_or_create(&self, resource_id: ResourceId) -> SharedLedger {
        self.ledgers
            .entry(resource_id)
            .or_insert_with(|| {
                std::sync::Arc::new(tokio::sync::RwLock::new(ResourceLedger::new(resource_id)))
            })
            .value()
            .clone()
    }

    pub fn resource_ids(&self) -> Vec<ResourceId> {
        self.ledgers.iter().map(|e| *e.key()).collect()
    }

    // ── Indexes ──────────────────────────────────────────────

    pub fn resource_for_booking(&self, booking_id: &BookingId) -> Option<ResourceId> {
        self.booking_to_resource
            .get(booking_id)
            .map(|e| *e.value())
    }

    pub fn patron_booking_ids(&self, patron_id: &PatronId) -> Vec<BookingId> {
        self.patron_bookings
            .get(patron_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    fn index_booking(&self, id: BookingId, resource_id: ResourceId, patron_id: PatronId) {
        self.booking_to_resource.insert(id, resource_id);
        self.patron_bookings.entry(patron_id).or_default().push(id);
    }

    fn unindex_booking(&self, id: BookingId, patron_id: PatronId) {
        self.booking_to_resource.remove(&id);
        if let Some(mut ids) = self.patron_bookings.get_mut(&patron_id) {
            ids.retain(|b| b != &id);
        }
    }

    // ── Event application ────────────────────────────────────

    /// Apply an event to a ledger the caller has write-locked. Used by
    /// live mutations and by journal replay.
    pub fn apply_event(&self, ledger: &mut ResourceLedger, event: &Event) {
        match event {
            Event::BookingCreated {
                id,
                resource_id,
                patron_id,
                patron_name,
                kind,
                checkin,
                checkout,
            } => {
                ledger.insert_booking(Booking {
                    id: *id,
                    resource_id: *resource_id,
                    patron_id: *patron_id,
                    patron_name: patron_name.clone(),
                    kind: *kind,
                    range: DateRange::new(*checkin, *checkout),
                });
                self.index_booking(*id, *resource_id, *patron_id);
            }
            Event::BookingRenewed { id, checkout, .. } => {
                if let Some(booking) = ledger.booking_mut(*id) {
                    booking.range.end = *checkout;
                }
            }
            Event::BookingPromoted { id, .. } => {
                if let Some(booking) = ledger.booking_mut(*id) {
                    booking.kind = BookingKind::Borrow;
                }
            }
            Event::BookingReturned { id, .. } => {
                if let Some(booking) = ledger.remove_booking(*id) {
                    self.unindex_booking(*id, booking.patron_id);
                }
            }
        }
    }
}
