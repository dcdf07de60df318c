mod availability;
mod error;
mod lifecycle;
mod mutations;
mod pairing;
mod queries;
mod reschedule;
mod store;
mod validate;

pub use availability::{AvailabilityInfo, BlockReason, Conflict, free_windows, merge_overlapping};
pub use error::EngineError;
pub use lifecycle::{Action, early_start_allowance};
pub use mutations::NewReservation;
pub use reschedule::ProposedChange;
pub use store::{InMemoryStore, Store};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::clock::{Clock, SystemClock};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

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

type Pending = Vec<(Event, oneshot::Sender<io::Result<()>>)>;

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued behind it.
/// 3. One flush_sync for the whole batch, then answer every sender.
///
/// A non-append command found while draining closes the batch and runs after it.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch: Pending = match cmd {
            WalCommand::Append { event, response } => vec![(event, response)],
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut trailing = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    trailing = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, batch);
        if let Some(cmd) = trailing {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, mut batch: Pending) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, &batch);
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for {} events: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &Pending) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after a failed append so half-buffered bytes don't ride along
    // with the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
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
        WalCommand::Append { event, response } => commit_batch(wal, vec![(event, response)]),
    }
}

/// Scheduling engine. Validation runs on pure functions; this type owns
/// ordering, durability, and fan-out.
///
/// Every mutation holds the per-room guards of the rooms it touches (taken in
/// id order), re-reads state under them, then appends to the WAL and applies.
/// Reads go straight to the store.
pub struct Engine {
    pub(super) store: Arc<dyn Store>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    locks: DashMap<Ulid, Arc<Mutex<()>>>,
    /// Writers share it; compaction takes it exclusively so no event is
    /// durable-but-unapplied while the snapshot is cut.
    commit_barrier: RwLock<()>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        Self::with_parts(
            wal_path,
            Arc::new(InMemoryStore::new()),
            Arc::new(SystemClock),
            notify,
        )
    }

    /// Build over an explicit store and clock. The WAL at `wal_path` is
    /// replayed into `store` before the writer starts.
    pub fn with_parts(
        wal_path: PathBuf,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        notify: Arc<NotifyHub>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        for event in &events {
            store.apply(event);
        }
        tracing::info!("replayed {} events from {}", events.len(), wal_path.display());

        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            store,
            clock,
            wal_tx,
            notify,
            locks: DashMap::new(),
            commit_barrier: RwLock::new(()),
        })
    }

    pub fn now(&self) -> Ts {
        self.clock.now()
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    /// WAL-append + apply + notify. Callers hold the guards of every room the
    /// event touches.
    pub(super) async fn persist_and_apply(&self, event: Event) -> Result<(), EngineError> {
        let rooms = self.rooms_for(&event);
        {
            let _shared = self.commit_barrier.read().await;
            self.wal_append(&event).await?;
            self.store.apply(&event);
        }
        metrics::counter!(observability::EVENTS_COMMITTED_TOTAL, "event" => event.name())
            .increment(1);
        match rooms {
            Some(rooms) => {
                for room_id in rooms {
                    self.notify.send(room_id, &event);
                }
            }
            None => self.notify.broadcast(&event),
        }
        Ok(())
    }

    /// Rooms whose watchers hear about `event`. `None` means every room.
    fn rooms_for(&self, event: &Event) -> Option<Vec<Ulid>> {
        match event {
            Event::RoomRegistered { room } => Some(vec![room.id]),
            Event::RoomsPaired { a, b } => Some(vec![*a, *b]),
            Event::MaintenanceSet { room_id, .. } | Event::MaintenanceCleared { room_id } => {
                Some(vec![*room_id])
            }
            Event::HolidayRegistered { .. } | Event::HolidayRemoved { .. } => None,
            Event::ReservationCreated { reservation } => Some(reservation.room_ids().collect()),
            Event::ReservationRetitled { id, .. }
            | Event::ReservationMoved { id, .. }
            | Event::ReservationStarted { id, .. }
            | Event::ReservationCompleted { id, .. }
            | Event::ReservationCancelled { id, .. }
            | Event::ReservationDeleted { id } => Some(
                self.store
                    .get_reservation(id)
                    .map(|r| r.room_ids().collect())
                    .unwrap_or_default(),
            ),
        }
    }

    /// Acquire the guards for `ids` in ascending order. Two writers over
    /// overlapping room sets therefore never wait on each other in a cycle.
    /// Ids being created (rooms, holidays, reservations) are guarded the same way.
    pub(super) async fn lock_ids(
        &self,
        ids: impl IntoIterator<Item = Ulid>,
    ) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::new();
        for id in pairing::lock_order(ids) {
            let lock = self.locks.entry(id).or_default().value().clone();
            guards.push(lock.lock_owned().await);
        }
        guards
    }

    /// Drop lock entries no writer holds or waits on. Entries are cloned out
    /// under the map's shard lock, so an entry in use always has a count above one.
    pub fn prune_locks(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - self.locks.len()
    }

    /// Cut a snapshot and swap it in as the new WAL.
    pub(super) async fn compact(&self) -> Result<usize, EngineError> {
        let _exclusive = self.commit_barrier.write().await;
        let events = self.store.snapshot();
        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(count)
    }
}
