use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{error, info};

use crate::audit::{PromotionLog, PromotionRecord};
use crate::engine::Engine;
use crate::model::BookingId;

/// Outcome summary of one sweep run.
#[derive(Debug)]
pub struct SweepReport {
    pub date: NaiveDate,
    pub records: Vec<PromotionRecord>,
}

impl SweepReport {
    pub fn promoted(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome == crate::audit::PromotionOutcome::Promoted)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.records.len() - self.promoted()
    }
}

/// Promote every reservation whose checkin date is today and record each
/// outcome in the audit log. Safe to re-run: an already promoted booking
/// no longer matches the Reserve filter, so a second run on the same day
/// is a no-op.
pub async fn run_promotion_sweep(engine: &Engine, audit: &PromotionLog) -> SweepReport {
    let start = std::time::Instant::now();
    let today = engine.today();
    let due = engine.due_reservations(today).await;
    info!("promotion sweep for {today}: {} reservation(s) due", due.len());

    let report = promote_all(engine, audit, &due, today).await;

    metrics::counter!(crate::observability::SWEEP_RUNS_TOTAL).increment(1);
    metrics::histogram!(crate::observability::SWEEP_DURATION_SECONDS)
        .record(start.elapsed().as_secs_f64());
    info!(
        "promotion sweep for {today} done: {} promoted, {} failed",
        report.promoted(),
        report.failed()
    );
    report
}

/// Promote each booking independently: one failure is recorded and does
/// not abort the rest of the run.
async fn promote_all(
    engine: &Engine,
    audit: &PromotionLog,
    due: &[BookingId],
    date: NaiveDate,
) -> SweepReport {
    let mut records = Vec::with_capacity(due.len());
    for &booking_id in due {
        let record = match engine.promote_reservation(booking_id).await {
            Ok(()) => {
                info!("promoted reservation {booking_id}");
                PromotionRecord::promoted(date, booking_id)
            }
            Err(e) => {
                // Benign when the booking was returned or promoted between
                // selection and the conditional update.
                tracing::debug!("promotion skipped for {booking_id}: {e}");
                PromotionRecord::failed(date, booking_id, e.to_string())
            }
        };
        let outcome = match record.outcome {
            crate::audit::PromotionOutcome::Promoted => "promoted",
            crate::audit::PromotionOutcome::Failed => "failed",
        };
        metrics::counter!(crate::observability::PROMOTIONS_TOTAL, "outcome" => outcome)
            .increment(1);
        if let Err(e) = audit.append(&record) {
            error!("failed to record promotion outcome for {booking_id}: {e}");
        }
        records.push(record);
    }
    SweepReport { date, records }
}

/// Background task that runs the promotion sweep at the start of every
/// calendar day. The startup catch-up run is the caller's responsibility
/// (`run_promotion_sweep` before spawning this).
pub async fn run_sweep_scheduler(engine: Arc<Engine>, audit: Arc<PromotionLog>) {
    loop {
        let delay = delay_until_next_day(chrono::Local::now().naive_local());
        tokio::time::sleep(delay).await;
        run_promotion_sweep(&engine, &audit).await;
    }
}

/// Time remaining until the next local midnight. Falls back to a full day
/// on calendar arithmetic edge cases.
fn delay_until_next_day(now: NaiveDateTime) -> Duration {
    const FALLBACK: Duration = Duration::from_secs(24 * 60 * 60);
    let Some(next_day) = now.date().succ_opt() else {
        return FALLBACK;
    };
    let Some(midnight) = next_day.and_hms_opt(0, 0, 0) else {
        return FALLBACK;
    };
    (midnight - now).to_std().unwrap_or(FALLBACK)
}

/// Background task that compacts the journal once the append count since
/// the last compaction crosses `threshold`.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends >= threshold {
            match engine.compact_journal().await {
                Ok(()) => info!("journal compacted after {appends} appends"),
                Err(e) => error!("journal compaction failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::PromotionOutcome;
    use crate::catalog::{Catalog, MemoryCatalog, ResourceMeta};
    use crate::clock::Clock;
    use crate::model::{BookingKind, PatronRef};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use ulid::Ulid;

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

    fn test_paths(name: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join("circulate_test_sweep").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        (dir.join("bookings.wal"), dir.join("promotions"))
    }

    fn patron(name: &str) -> PatronRef {
        PatronRef {
            id: Ulid::new(),
            name: name.into(),
        }
    }

    fn seeded_resource(catalog: &MemoryCatalog) -> Ulid {
        let id = Ulid::new();
        catalog.add(ResourceMeta {
            id,
            title: "Test Book".into(),
            author: "Anon".into(),
            genre: "Fiction".into(),
            published: 2001,
            cover_url: None,
        });
        id
    }

    #[tokio::test]
    async fn sweep_promotes_due_reservation() {
        let (wal, audit_dir) = test_paths("promotes_due");
        let catalog = Arc::new(MemoryCatalog::new());
        let clock = FixedClock::new(d(2024, 3, 1));
        let engine =
            Engine::new(wal, catalog.clone() as Arc<dyn Catalog>, clock.clone()).unwrap();
        let audit = PromotionLog::open(audit_dir).unwrap();

        let book = seeded_resource(&catalog);
        let booking_id = engine
            .create_reservation(book, patron("Ada"), d(2024, 3, 10), d(2024, 3, 15))
            .await
            .unwrap();

        // The reservation's checkin day arrives
        clock.set(d(2024, 3, 10));
        let report = run_promotion_sweep(&engine, &audit).await;
        assert_eq!(report.promoted(), 1);
        assert_eq!(report.failed(), 0);

        let booking = engine.find_booking(booking_id).await.unwrap();
        assert_eq!(booking.kind, BookingKind::Borrow);
        assert!(!engine.list_available().await.contains(&book));

        let records = audit.read_day(d(2024, 3, 10)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].booking_id, booking_id);
        assert_eq!(records[0].outcome, PromotionOutcome::Promoted);
    }

    #[tokio::test]
    async fn sweep_is_idempotent_within_a_day() {
        let (wal, audit_dir) = test_paths("idempotent");
        let catalog = Arc::new(MemoryCatalog::new());
        let clock = FixedClock::new(d(2024, 3, 10));
        let engine =
            Engine::new(wal, catalog.clone() as Arc<dyn Catalog>, clock.clone()).unwrap();
        let audit = PromotionLog::open(audit_dir).unwrap();

        let book = seeded_resource(&catalog);
        engine
            .create_reservation(book, patron("Ada"), d(2024, 3, 10), d(2024, 3, 15))
            .await
            .unwrap();

        let first = run_promotion_sweep(&engine, &audit).await;
        assert_eq!(first.promoted(), 1);

        // Second run finds nothing in Reserve state
        let second = run_promotion_sweep(&engine, &audit).await;
        assert!(second.records.is_empty());
        assert_eq!(audit.read_day(d(2024, 3, 10)).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sweep_ignores_other_days() {
        let (wal, audit_dir) = test_paths("other_days");
        let catalog = Arc::new(MemoryCatalog::new());
        let clock = FixedClock::new(d(2024, 3, 9));
        let engine =
            Engine::new(wal, catalog.clone() as Arc<dyn Catalog>, clock.clone()).unwrap();
        let audit = PromotionLog::open(audit_dir).unwrap();

        let book = seeded_resource(&catalog);
        let booking_id = engine
            .create_reservation(book, patron("Ada"), d(2024, 3, 10), d(2024, 3, 15))
            .await
            .unwrap();

        // One day early: nothing due
        let report = run_promotion_sweep(&engine, &audit).await;
        assert!(report.records.is_empty());
        let booking = engine.find_booking(booking_id).await.unwrap();
        assert_eq!(booking.kind, BookingKind::Reserve);
    }

    #[tokio::test]
    async fn promote_all_isolates_failures() {
        let (wal, audit_dir) = test_paths("isolated_failures");
        let catalog = Arc::new(MemoryCatalog::new());
        let clock = FixedClock::new(d(2024, 3, 10));
        let engine =
            Engine::new(wal, catalog.clone() as Arc<dyn Catalog>, clock.clone()).unwrap();
        let audit = PromotionLog::open(audit_dir).unwrap();

        let book = seeded_resource(&catalog);
        let good = engine
            .create_reservation(book, patron("Ada"), d(2024, 3, 10), d(2024, 3, 15))
            .await
            .unwrap();
        let stale = Ulid::new(); // never existed

        let report = promote_all(&engine, &audit, &[stale, good], d(2024, 3, 10)).await;
        assert_eq!(report.promoted(), 1);
        assert_eq!(report.failed(), 1);

        let records = audit.read_day(d(2024, 3, 10)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].outcome, PromotionOutcome::Failed);
        assert!(records[0].reason.is_some());
        assert_eq!(records[1].outcome, PromotionOutcome::Promoted);

        // The good reservation was still promoted
        let booking = engine.find_booking(good).await.unwrap();
        assert_eq!(booking.kind, BookingKind::Borrow);
    }

    #[test]
    fn delay_until_next_day_spans_to_midnight() {
        let now = d(2024, 3, 10).and_hms_opt(22, 0, 0).unwrap();
        assert_eq!(delay_until_next_day(now), Duration::from_secs(2 * 60 * 60));

        let start_of_day = d(2024, 3, 10).and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(
            delay_until_next_day(start_of_day),
            Duration::from_secs(24 * 60 * 60)
        );
    }
}
