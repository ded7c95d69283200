//! Library circulation core: borrow/reserve bookings over a shared
//! catalog, date-overlap conflict resolution, and the daily sweep that
//! promotes due reservations to active loans.

pub mod audit;
pub mod catalog;
pub mod clock;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod sweep;
pub mod wal;
