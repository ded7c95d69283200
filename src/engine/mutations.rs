use chrono::NaiveDate;
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_reservation_conflict, validate_range};
use super::{Engine, EngineError, WalCommand};

fn record_op<T>(op: &'static str, result: &Result<T, EngineError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(_) => "error",
    };
    metrics::counter!(crate::observability::BOOKING_OPS_TOTAL, "op" => op, "status" => status)
        .increment(1);
}

impl Engine {
    /// Immediate loan, effective today. The availability check and the
    /// insert happen under the resource's write lock, so two concurrent
    /// borrows of the same resource cannot both pass.
    pub async fn create_borrow(
        &self,
        resource_id: ResourceId,
        patron: PatronRef,
        checkin: NaiveDate,
        checkout: NaiveDate,
    ) -> Result<BookingId, EngineError> {
        let result = self
            .create_booking(resource_id, patron, checkin, checkout, BookingKind::Borrow)
            .await;
        record_op("create_borrow", &result);
        result
    }

    /// Future-dated claim. Unlike a borrow this does not look at the
    /// current loan: a resource may be reserved for a later window while
    /// presently lent out.
    pub async fn create_reservation(
        &self,
        resource_id: ResourceId,
        patron: PatronRef,
        checkin: NaiveDate,
        checkout: NaiveDate,
    ) -> Result<BookingId, EngineError> {
        let result = self
            .create_booking(resource_id, patron, checkin, checkout, BookingKind::Reserve)
            .await;
        record_op("create_reservation", &result);
        result
    }

    async fn create_booking(
        &self,
        resource_id: ResourceId,
        patron: PatronRef,
        checkin: NaiveDate,
        checkout: NaiveDate,
        kind: BookingKind,
    ) -> Result<BookingId, EngineError> {
        if patron.name.len() > MAX_PATRON_NAME_LEN {
            return Err(EngineError::LimitExceeded("patron name too long"));
        }

        let today = self.today();
        match kind {
            // A borrow starts exactly today; backdated or future-dated
            // immediate loans are rejected, not corrected.
            BookingKind::Borrow if checkin != today => {
                return Err(EngineError::InvalidDateRange("borrow must check in today"));
            }
            BookingKind::Reserve if checkin < today => {
                return Err(EngineError::InvalidDateRange(
                    "reservation may not check in in the past",
                ));
            }
            _ => {}
        }
        if checkin > checkout {
            return Err(EngineError::InvalidDateRange("checkin after checkout"));
        }
        let range = DateRange::new(checkin, checkout);
        validate_range(&range)?;

        if !self.catalog.exists(resource_id).await {
            return Err(EngineError::NotFound(resource_id));
        }

        let ledger = self.store.ledger_or_create(resource_id);
        let mut guard = ledger.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many bookings on resource"));
        }
        if kind == BookingKind::Borrow && guard.active_borrow().is_some() {
            return Err(EngineError::ResourceUnavailable(resource_id));
        }
        check_no_reservation_conflict(&guard, &range, None)?;

        let id = Ulid::new();
        let event = Event::BookingCreated {
            id,
            resource_id,
            patron_id: patron.id,
            patron_name: patron.name,
            kind,
            checkin,
            checkout,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(id)
    }

    /// Move a booking's checkout date forward. Preponing is rejected, and
    /// the extended range must still clear every reservation on the
    /// resource.
    pub async fn renew(
        &self,
        booking_id: BookingId,
        new_checkout: NaiveDate,
    ) -> Result<(), EngineError> {
        let result = self.renew_inner(booking_id, new_checkout).await;
        record_op("renew", &result);
        result
    }

    async fn renew_inner(
        &self,
        booking_id: BookingId,
        new_checkout: NaiveDate,
    ) -> Result<(), EngineError> {
        let (resource_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;

        if new_checkout < booking.checkout_date() {
            return Err(EngineError::InvalidRenewal {
                current: booking.checkout_date(),
                requested: new_checkout,
            });
        }
        if new_checkout < booking.checkin_date() {
            return Err(EngineError::InvalidDateRange("checkout before checkin"));
        }
        let new_range = DateRange::new(booking.checkin_date(), new_checkout);
        validate_range(&new_range)?;
        check_no_reservation_conflict(&guard, &new_range, Some(booking_id))?;

        let event = Event::BookingRenewed {
            id: booking_id,
            resource_id,
            checkout: new_checkout,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Delete the booking. A booking that is already gone reports
    /// `NotFound`; callers treat that as "already returned", not as a
    /// hard failure.
    pub async fn mark_returned(&self, booking_id: BookingId) -> Result<(), EngineError> {
        let result = self.mark_returned_inner(booking_id).await;
        record_op("mark_returned", &result);
        result
    }

    async fn mark_returned_inner(&self, booking_id: BookingId) -> Result<(), EngineError> {
        let (resource_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        if guard.booking(booking_id).is_none() {
            return Err(EngineError::NotFound(booking_id));
        }
        let event = Event::BookingReturned {
            id: booking_id,
            resource_id,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Conditional Reserve -> Borrow transition, used only by the sweep.
    /// The kind check runs under the write lock, so a concurrent return or
    /// an earlier sweep run cannot be overwritten: a booking that is no
    /// longer Reserve is `NotPromotable`.
    pub async fn promote_reservation(&self, booking_id: BookingId) -> Result<(), EngineError> {
        let (resource_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if booking.kind != BookingKind::Reserve {
            return Err(EngineError::NotPromotable(booking_id));
        }
        let event = Event::BookingPromoted {
            id: booking_id,
            resource_id,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Compact the journal by rewriting it with only the events needed to
    /// recreate the live bookings.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();
        for resource_id in self.store.resource_ids() {
            let Some(ledger) = self.store.ledger(&resource_id) else {
                continue;
            };
            let guard = ledger.read().await;
            for booking in &guard.bookings {
                events.push(Event::BookingCreated {
                    id: booking.id,
                    resource_id: booking.resource_id,
                    patron_id: booking.patron_id,
                    patron_name: booking.patron_name.clone(),
                    kind: booking.kind,
                    checkin: booking.checkin_date(),
                    checkout: booking.checkout_date(),
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
