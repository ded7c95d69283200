//! End-to-end booking lifecycle: reserve, conflicting borrow, promotion
//! sweep with its audit trail, renewal, return, and restart recovery,
//! all through the public crate surface.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use ulid::Ulid;

use circulate::audit::{PromotionLog, PromotionOutcome};
use circulate::catalog::{Catalog, MemoryCatalog, ResourceMeta};
use circulate::clock::Clock;
use circulate::engine::{Engine, EngineError};
use circulate::model::{BookingKind, DateRange, PatronRef};
use circulate::sweep;

struct FixedClock(Mutex<NaiveDate>);

impl FixedClock {
    fn new(date: NaiveDate) -> Arc<Self> {
        Arc::new(Self(Mutex::new(date)))
    }

    fn set(&self, date: NaiveDate) {
        *self.0.lock().unwrap() = date;
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.0.lock().unwrap()
    }
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join("circulate_test_lifecycle")
        .join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn patron(name: &str) -> PatronRef {
    PatronRef {
        id: Ulid::new(),
        name: name.into(),
    }
}

fn book(catalog: &MemoryCatalog, title: &str) -> Ulid {
    let id = Ulid::new();
    catalog.add(ResourceMeta {
        id,
        title: title.into(),
        author: "Anon".into(),
        genre: "Fiction".into(),
        published: 1998,
        cover_url: None,
    });
    id
}

#[tokio::test]
async fn full_reservation_lifecycle() {
    let dir = test_dir("full_lifecycle");
    let catalog = Arc::new(MemoryCatalog::new());
    let clock = FixedClock::new(d(2024, 3, 1));
    let engine = Engine::new(
        dir.join("bookings.wal"),
        catalog.clone() as Arc<dyn Catalog>,
        clock.clone(),
    )
    .unwrap();
    let audit = PromotionLog::open(dir.join("promotions")).unwrap();

    let b1 = book(&catalog, "The Left Hand of Darkness");
    let b2 = book(&catalog, "Solaris");
    let ada = patron("Ada");
    let bob = patron("Bob");

    // Ada reserves B1 for 2024-03-10..2024-03-15
    let reservation = engine
        .create_reservation(b1, ada.clone(), d(2024, 3, 10), d(2024, 3, 15))
        .await
        .unwrap();

    // On 2024-03-10 Bob tries to borrow B1 for an overlapping window and
    // is refused with the reservation's exact dates.
    clock.set(d(2024, 3, 10));
    let refused = engine
        .create_borrow(b1, bob.clone(), d(2024, 3, 10), d(2024, 3, 12))
        .await;
    match refused {
        Err(EngineError::ReservationConflict {
            resource_id,
            window,
        }) => {
            assert_eq!(resource_id, b1);
            assert_eq!(window, DateRange::new(d(2024, 3, 10), d(2024, 3, 15)));
        }
        other => panic!("expected ReservationConflict, got {other:?}"),
    }

    // Bob borrows B2 instead
    let bobs_loan = engine
        .create_borrow(b2, bob.clone(), d(2024, 3, 10), d(2024, 3, 12))
        .await
        .unwrap();

    // The start-of-day sweep promotes Ada's reservation to an active loan
    let report = sweep::run_promotion_sweep(&engine, &audit).await;
    assert_eq!(report.promoted(), 1);
    assert_eq!(report.failed(), 0);

    let promoted = engine.find_booking(reservation).await.unwrap();
    assert_eq!(promoted.kind, BookingKind::Borrow);
    assert!(!engine.list_available().await.contains(&b1));

    // The day's audit artifact names the booking with a success outcome
    let records = audit.read_day(d(2024, 3, 10)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].booking_id, reservation);
    assert_eq!(records[0].outcome, PromotionOutcome::Promoted);

    // Running the sweep again the same day is a no-op
    let rerun = sweep::run_promotion_sweep(&engine, &audit).await;
    assert!(rerun.records.is_empty());
    assert_eq!(audit.read_day(d(2024, 3, 10)).unwrap().len(), 1);

    // Bob renews his B2 loan out to 2024-03-20; nothing is reserved on B2
    engine.renew(bobs_loan, d(2024, 3, 20)).await.unwrap();
    let renewed = engine.find_booking(bobs_loan).await.unwrap();
    assert_eq!(renewed.checkout_date(), d(2024, 3, 20));

    // Preponing is rejected outright
    let prepone = engine.renew(bobs_loan, d(2024, 3, 15)).await;
    assert!(matches!(prepone, Err(EngineError::InvalidRenewal { .. })));

    // Bob's history shows his loan with catalog metadata attached
    let history = engine.list_history(bob.id).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].resource.as_ref().unwrap().title, "Solaris");

    // A librarian marks both loans returned; everything is available again
    engine.mark_returned(reservation).await.unwrap();
    engine.mark_returned(bobs_loan).await.unwrap();
    let mut available = engine.list_available().await;
    available.sort();
    let mut all = vec![b1, b2];
    all.sort();
    assert_eq!(available, all);

    // Returning again reports the recoverable "already returned" condition
    assert!(matches!(
        engine.mark_returned(bobs_loan).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn startup_sweep_recovers_missed_promotions() {
    let dir = test_dir("startup_recovery");
    let catalog = Arc::new(MemoryCatalog::new());
    let clock = FixedClock::new(d(2024, 3, 1));
    let wal_path = dir.join("bookings.wal");

    let reservation;
    {
        let engine = Engine::new(
            wal_path.clone(),
            catalog.clone() as Arc<dyn Catalog>,
            clock.clone(),
        )
        .unwrap();
        let b1 = book(&catalog, "Piranesi");
        reservation = engine
            .create_reservation(b1, patron("Ada"), d(2024, 3, 10), d(2024, 3, 15))
            .await
            .unwrap();
        // Process goes down before 2024-03-10; the daily trigger never fires.
    }

    // Restart on the reservation's checkin day: the startup run catches up.
    clock.set(d(2024, 3, 10));
    let engine = Engine::new(wal_path, catalog.clone() as Arc<dyn Catalog>, clock.clone()).unwrap();
    let audit = PromotionLog::open(dir.join("promotions")).unwrap();

    let report = sweep::run_promotion_sweep(&engine, &audit).await;
    assert_eq!(report.promoted(), 1);

    let booking = engine.find_booking(reservation).await.unwrap();
    assert_eq!(booking.kind, BookingKind::Borrow);
    assert_eq!(
        audit.read_day(d(2024, 3, 10)).unwrap()[0].booking_id,
        reservation
    );
}

#[tokio::test]
async fn competing_claims_resolve_deterministically() {
    let dir = test_dir("competing_claims");
    let catalog = Arc::new(MemoryCatalog::new());
    let clock = FixedClock::new(d(2024, 1, 1));
    let engine = Engine::new(
        dir.join("bookings.wal"),
        catalog.clone() as Arc<dyn Catalog>,
        clock.clone(),
    )
    .unwrap();

    let b1 = book(&catalog, "Blindsight");

    // Non-overlapping reservations coexist
    engine
        .create_reservation(b1, patron("Ada"), d(2024, 1, 1), d(2024, 1, 4))
        .await
        .unwrap();
    engine
        .create_reservation(b1, patron("Bob"), d(2024, 1, 5), d(2024, 1, 10))
        .await
        .unwrap();

    // A third claim overlapping either window is refused
    let refused = engine
        .create_reservation(b1, patron("Eve"), d(2024, 1, 4), d(2024, 1, 5))
        .await;
    assert!(matches!(
        refused,
        Err(EngineError::ReservationConflict { .. })
    ));

    // Two simultaneous borrows of one available book: exactly one wins
    let b2 = book(&catalog, "Ubik");
    let (first, second) = tokio::join!(
        engine.create_borrow(b2, patron("Ada"), d(2024, 1, 1), d(2024, 1, 3)),
        engine.create_borrow(b2, patron("Bob"), d(2024, 1, 1), d(2024, 1, 3)),
    );
    assert_eq!(
        [first.is_ok(), second.is_ok()].iter().filter(|&&x| x).count(),
        1,
        "exactly one concurrent borrow must succeed"
    );
}
