use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use crate::model::*;

use super::Engine;

impl Engine {
    pub async fn find_booking(&self, booking_id: BookingId) -> Option<Booking> {
        let resource_id = self.store.resource_for_booking(&booking_id)?;
        let ledger = self.store.ledger(&resource_id)?;
        let guard = ledger.read().await;
        guard.booking(booking_id).cloned()
    }

    /// Bookings on one resource, optionally filtered by kind.
    pub async fn find_by_resource(
        &self,
        resource_id: ResourceId,
        kind: Option<BookingKind>,
    ) -> Vec<Booking> {
        let Some(ledger) = self.store.ledger(&resource_id) else {
            return Vec::new();
        };
        let guard = ledger.read().await;
        guard
            .bookings
            .iter()
            .filter(|b| kind.is_none_or(|k| b.kind == k))
            .cloned()
            .collect()
    }

    pub async fn find_by_patron(&self, patron_id: PatronId) -> Vec<Booking> {
        let mut bookings = Vec::new();
        for id in self.store.patron_booking_ids(&patron_id) {
            if let Some(booking) = self.find_booking(id).await {
                bookings.push(booking);
            }
        }
        bookings
    }

    /// Every Reserve booking across all resources.
    pub async fn find_all_reservations(&self) -> Vec<Booking> {
        let mut reservations = Vec::new();
        for resource_id in self.store.resource_ids() {
            if let Some(ledger) = self.store.ledger(&resource_id) {
                let guard = ledger.read().await;
                reservations.extend(guard.reservations().cloned());
            }
        }
        reservations
    }

    /// Distinct resource ids with an active loan, the basis of the
    /// availability view.
    pub async fn borrowed_resource_ids(&self) -> HashSet<ResourceId> {
        let mut borrowed = HashSet::new();
        for resource_id in self.store.resource_ids() {
            if let Some(ledger) = self.store.ledger(&resource_id) {
                let guard = ledger.read().await;
                if guard.active_borrow().is_some() {
                    borrowed.insert(resource_id);
                }
            }
        }
        borrowed
    }

    /// Catalog ids with no active loan. Reservations for future windows do
    /// not make a resource unavailable.
    pub async fn list_available(&self) -> Vec<ResourceId> {
        let borrowed = self.borrowed_resource_ids().await;
        self.catalog
            .list_ids()
            .await
            .into_iter()
            .filter(|id| !borrowed.contains(id))
            .collect()
    }

    /// A patron's bookings enriched with catalog metadata.
    pub async fn list_history(&self, patron_id: PatronId) -> Vec<BookingDetails> {
        let bookings = self.find_by_patron(patron_id).await;
        self.enrich(bookings).await
    }

    /// The librarian desk view: every booking of either kind, enriched.
    pub async fn list_borrows(&self) -> Vec<BookingDetails> {
        let mut bookings = Vec::new();
        for resource_id in self.store.resource_ids() {
            if let Some(ledger) = self.store.ledger(&resource_id) {
                let guard = ledger.read().await;
                bookings.extend(guard.bookings.iter().cloned());
            }
        }
        self.enrich(bookings).await
    }

    /// Reserve bookings whose checkin date is exactly `on`. The sweep's
    /// selection query.
    pub async fn due_reservations(&self, on: NaiveDate) -> Vec<BookingId> {
        let mut due = Vec::new();
        for resource_id in self.store.resource_ids() {
            if let Some(ledger) = self.store.ledger(&resource_id) {
                let guard = ledger.read().await;
                due.extend(
                    guard
                        .reservations()
                        .filter(|b| b.checkin_date() == on)
                        .map(|b| b.id),
                );
            }
        }
        due
    }

    /// Join bookings with catalog records via one batch lookup. Bookings
    /// the catalog no longer knows are kept with `resource: None`.
    async fn enrich(&self, bookings: Vec<Booking>) -> Vec<BookingDetails> {
        let mut ids: Vec<ResourceId> = bookings.iter().map(|b| b.resource_id).collect();
        ids.sort();
        ids.dedup();
        let metas: HashMap<ResourceId, _> = self
            .catalog
            .metadata_batch(&ids)
            .await
            .into_iter()
            .map(|m| (m.id, m))
            .collect();
        bookings
            .into_iter()
            .map(|booking| {
                let resource = metas.get(&booking.resource_id).cloned();
                BookingDetails { booking, resource }
            })
            .collect()
    }
}
