mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use error::EngineError;
pub use store::BookingStore;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::model::*;
use crate::wal::Wal;

pub type SharedLedger = Arc<RwLock<ResourceLedger>>;

// ── Group-commit journal channel ─────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty: flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking lifecycle manager: validates and creates borrows and
/// reservations, renews and returns bookings, promotes due reservations,
/// and answers availability/history queries. All state lives in the
/// `BookingStore`; every acknowledged mutation is already durable in the
/// journal.
pub struct Engine {
    pub(super) store: BookingStore,
    wal_tx: mpsc::Sender<WalCommand>,
    pub(super) catalog: Arc<dyn Catalog>,
    clock: Arc<dyn Clock>,
}

impl Engine {
    /// Open the journal at `wal_path`, replay it into a fresh store, and
    /// spawn the group-commit writer. Must be called inside a tokio
    /// runtime.
    pub fn new(
        wal_path: PathBuf,
        catalog: Arc<dyn Catalog>,
        clock: Arc<dyn Clock>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: BookingStore::new(),
            wal_tx,
            catalog,
            clock,
        };

        // Replay events. We are the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention).
        for event in &events {
            let ledger = engine.store.ledger_or_create(event.resource_id());
            let mut guard = ledger.try_write().expect("replay: uncontended write");
            engine.store.apply_event(&mut guard, event);
        }

        Ok(engine)
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Write an event to the journal via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Journal-append + apply in one call, inside the caller's critical
    /// section. The mutation is durable before the lock is released.
    pub(super) async fn persist_and_apply(
        &self,
        ledger: &mut ResourceLedger,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_event(ledger, event);
        Ok(())
    }

    /// Lookup booking -> resource, get its ledger, acquire the write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &BookingId,
    ) -> Result<(ResourceId, tokio::sync::OwnedRwLockWriteGuard<ResourceLedger>), EngineError> {
        let resource_id = self
            .store
            .resource_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let ledger = self
            .store
            .ledger(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = ledger.write_owned().await;
        Ok((resource_id, guard))
    }
}
