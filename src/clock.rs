use chrono::{Local, NaiveDate};

/// Source of "today". Injected into the engine so date-sensitive rules
/// (borrow starts today, reservation starts today or later, promotion due
/// today) can be exercised at fixed dates in tests.
pub trait Clock: Send + Sync {
    /// Current calendar date in local time.
    fn today(&self) -> NaiveDate;
}

/// Wall-clock implementation used by the daemon.
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}
