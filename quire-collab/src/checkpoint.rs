//! Checkpoint scheduling: durable writes of room snapshots.
//!
//! Three triggers share one write path:
//! ```text
//!  save-document (client, ~2s) ──► Always   ─┐
//!  session ticker (server)     ──► IfDirty  ─┼─► checkpoint_lock ─► clone snapshot ─► upsert
//!  last leave (optional)       ──► flush    ─┘      (per room)       (room lock)       (blocking pool)
//! ```
//! The server snapshot is always what gets written. Failures are logged and
//! left for the next trigger to supersede.

use std::time::Duration;

use log::{debug, error, info};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::delta::Delta;
use crate::room::{Room, RoomState};
use crate::storage::{upsert_async, PersistedDocument, SharedStore, StoreError};

/// Default period between checkpoints of an active session.
pub const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointMode {
    /// Write even if nothing changed since the last checkpoint.
    Always,
    /// Write only if edits were applied since the last checkpoint.
    IfDirty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointOutcome {
    Written { revision: u64, last_saved: u64 },
    /// Nothing to write.
    Clean,
    /// Room was evicted or never finished loading.
    Skipped,
    Failed(StoreError),
}

impl CheckpointOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, CheckpointOutcome::Written { .. })
    }
}

/// Writes room snapshots to the document store.
#[derive(Clone)]
pub struct Checkpointer {
    store: SharedStore,
}

impl Checkpointer {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Persist the room's current snapshot.
    ///
    /// The room lock is held only long enough to clone the snapshot; the
    /// store write happens outside it so edits keep flowing.
    pub async fn checkpoint(&self, room: &Room, mode: CheckpointMode) -> CheckpointOutcome {
        let _write = room.checkpoint_lock.lock().await;

        let (snapshot, revision) = {
            let state = room.state.lock().await;
            match capture(&state, mode) {
                Ok(captured) => captured,
                Err(outcome) => return outcome,
            }
        };

        match self.write(room.id(), snapshot).await {
            Ok(record) => {
                let mut state = room.state.lock().await;
                mark_saved(&mut state, revision, &record);
                debug!(
                    "Checkpointed room '{}' at revision {revision} (lastSaved {})",
                    room.id(),
                    record.last_saved
                );
                CheckpointOutcome::Written {
                    revision,
                    last_saved: record.last_saved,
                }
            }
            Err(e) => {
                error!("Checkpoint of room '{}' failed: {e}", room.id());
                CheckpointOutcome::Failed(e)
            }
        }
    }

    /// Flush a dirty room whose locks the caller already holds (room lock
    /// and checkpoint lock). Used right before eviction.
    pub(crate) async fn flush_locked(&self, room_id: &str, state: &mut RoomState) -> CheckpointOutcome {
        let (snapshot, revision) = match capture(state, CheckpointMode::IfDirty) {
            Ok(captured) => captured,
            Err(outcome) => return outcome,
        };
        match self.write(room_id, snapshot).await {
            Ok(record) => {
                mark_saved(state, revision, &record);
                info!("Flushed room '{room_id}' before eviction (revision {revision})");
                CheckpointOutcome::Written {
                    revision,
                    last_saved: record.last_saved,
                }
            }
            Err(e) => {
                error!("Flush of room '{room_id}' before eviction failed: {e}");
                CheckpointOutcome::Failed(e)
            }
        }
    }

    async fn write(&self, room_id: &str, snapshot: Delta) -> Result<PersistedDocument, StoreError> {
        upsert_async(&self.store, room_id, snapshot).await
    }
}

fn capture(state: &RoomState, mode: CheckpointMode) -> Result<(Delta, u64), CheckpointOutcome> {
    if state.evicted {
        return Err(CheckpointOutcome::Skipped);
    }
    let snapshot = state.snapshot.as_ref().ok_or(CheckpointOutcome::Skipped)?;
    if mode == CheckpointMode::IfDirty && !state.is_dirty() {
        return Err(CheckpointOutcome::Clean);
    }
    Ok((snapshot.clone(), state.revision))
}

fn mark_saved(state: &mut RoomState, revision: u64, record: &PersistedDocument) {
    state.checkpointed_revision = state.checkpointed_revision.max(revision);
    state.last_checkpoint_at = Some(record.last_saved);
}

/// Per-session periodic checkpoint trigger.
///
/// Lives inside a session loop and is dropped with it, so no timer outlives
/// its connection. With no period configured, [`tick`](Self::tick) never
/// completes.
pub struct CheckpointTicker {
    interval: Option<Interval>,
}

impl CheckpointTicker {
    pub fn new(period: Option<Duration>) -> Self {
        let interval = period.filter(|p| !p.is_zero()).map(|p| {
            let mut interval = interval_at(Instant::now() + p, p);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        Self { interval }
    }

    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }

    /// Restart the period from now.
    pub fn reset(&mut self) {
        if let Some(interval) = self.interval.as_mut() {
            interval.reset();
        }
    }

    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
