mod capacity;
mod error;
mod mutations;
mod queries;
mod store;

pub use error::EngineError;
pub use store::BookingStore;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, mpsc, oneshot};

use crate::model::*;
use crate::wal::Wal;

pub type SharedSlotState = Arc<RwLock<SlotState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    /// Events committed together: all of them reach the same fsync.
    Append {
        events: Vec<Event>,
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

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders with the batch result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { events, response } => {
                let mut batch = vec![(events, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { events, response }) => {
                            batch.push((events, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_control(&mut wal, other);
                }
            }
            other => handle_control(&mut wal, other),
        }
    }
}

type PendingAppend = (Vec<Event>, oneshot::Sender<io::Result<()>>);

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    let event_count: usize = batch.iter().map(|(events, _)| events.len()).sum();
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(event_count as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for {event_count} events: {e}");
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    'outer: for (events, _) in batch {
        for event in events {
            if let Err(e) = wal.append_buffered(event) {
                append_err = Some(e);
                break 'outer;
            }
        }
    }
    // Flush even on append error so partially buffered bytes don't leak
    // into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { events, response } => {
            let mut batch = vec![(events, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

/// Booking state for the whole range: bookings, credentials and the WAL
/// they are rebuilt from.
pub struct Engine {
    pub(super) store: BookingStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) capacities: Capacities,
    /// Serializes credential writes so a new email is registered once.
    pub(super) credential_lock: Mutex<()>,
    /// One lock per email, held across the per-email count and the insert.
    pub(super) email_locks: DashMap<String, Arc<Mutex<()>>>,
    /// Mutations hold this shared; compaction holds it exclusively so no
    /// acknowledged append can fall between its snapshot and the file swap.
    pub(super) write_gate: RwLock<()>,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start its writer task. Must be called
    /// inside a tokio runtime.
    pub fn new(wal_path: PathBuf, capacities: Capacities) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?.events;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: BookingStore::new(),
            wal_tx,
            capacities,
            credential_lock: Mutex::new(()),
            email_locks: DashMap::new(),
            write_gate: RwLock::new(()),
        };

        // We're the sole owner of every slot here, so try_write never
        // contends. Blocking locks are off limits: this runs inside a runtime.
        for event in &events {
            match event {
                Event::BookingCreated { booking } => {
                    if engine.store.contains_booking(&booking.id) {
                        continue;
                    }
                    let slot = engine.store.get_or_create_slot(booking.slot_key());
                    let mut guard = slot
                        .try_write()
                        .map_err(|_| io::Error::other("replay: slot locked"))?;
                    engine.store.apply_to_slot(&mut guard, event);
                }
                Event::BookingCancelled { key, .. } => {
                    if let Some(slot) = engine.store.get_slot(key) {
                        let mut guard = slot
                            .try_write()
                            .map_err(|_| io::Error::other("replay: slot locked"))?;
                        engine.store.apply_to_slot(&mut guard, event);
                    }
                }
                Event::CredentialSet { .. } => engine.store.apply_credential(event),
            }
        }

        tracing::info!(
            "replayed {} events: {} bookings, {} credentials",
            events.len(),
            engine.store.booking_count(),
            engine.store.credential_entries().len()
        );
        Ok(engine)
    }

    pub fn capacities(&self) -> Capacities {
        self.capacities
    }

    pub fn store(&self) -> &BookingStore {
        &self.store
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append_all(vec![event.clone()]).await
    }

    /// Write several events in one commit.
    pub(super) async fn wal_append_all(&self, events: Vec<Event>) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub(super) async fn lock_email(&self, email: &str) -> OwnedMutexGuard<()> {
        let lock = self.email_locks.entry(email.to_string()).or_default().clone();
        lock.lock_owned().await
    }

    /// WAL-append, then apply to the locked slot. Memory is untouched if the
    /// append fails.
    pub(super) async fn persist_and_apply(
        &self,
        slot: &mut SlotState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_to_slot(slot, event);
        Ok(())
    }
}
