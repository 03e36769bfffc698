//! Process-wide room registry.
//!
//! ```text
//!  rooms:       "abc123" ──► Arc<Room> ─┐ Mutex<RoomState> { snapshot, members, … }
//!               "def456" ──► Arc<Room>  │
//!  connections: conn-id  ──► "abc123"   │  (at most one room per connection)
//! ```
//!
//! Both maps sit behind short synchronous locks that are never held across
//! an `.await`. Everything else happens under the room's own async lock, so
//! rooms never wait on each other.
//!
//! Creation and eviction race safely:
//! - a room is inserted *unloaded*, then loaded by the first joiner while it
//!   holds the room lock; later joiners queue on that lock;
//! - eviction marks the room `evicted` and removes it from the map while
//!   holding the room lock; a joiner that wakes up on an evicted room looks
//!   the id up again and recreates it from durable state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, error, info, warn};

use crate::broadcast::{deliver, AtomicBroadcastStats, BroadcastStats, Outbox};
use crate::checkpoint::{CheckpointMode, CheckpointOutcome, Checkpointer};
use crate::delta::Delta;
use crate::loader::DocumentLoader;
use crate::presence;
use crate::protocol::{ConnectionId, ServerEvent, UserIdentity};
use crate::reconciler::{self, Applied, ReconcileError};
use crate::room::Room;
use crate::storage::{SharedStore, StoreError};

/// What a successful join hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    /// Normalized room id.
    pub room_id: String,
    pub snapshot: Delta,
    pub members: Vec<UserIdentity>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("Room id must not be empty")]
    InvalidRoomId,
    #[error("Could not load room: {0}")]
    Storage(#[from] StoreError),
}

pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Arc<Room>>>,
    connections: Mutex<HashMap<ConnectionId, String>>,
    loader: DocumentLoader,
    checkpointer: Checkpointer,
    checkpoint_on_evict: bool,
    stats: AtomicBroadcastStats,
}

impl RoomRegistry {
    pub fn new(store: SharedStore) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
            loader: DocumentLoader::new(store.clone()),
            checkpointer: Checkpointer::new(store),
            checkpoint_on_evict: false,
            stats: AtomicBroadcastStats::new(),
        }
    }

    /// Flush a dirty room to the store when its last member leaves.
    pub fn with_checkpoint_on_evict(mut self, enabled: bool) -> Self {
        self.checkpoint_on_evict = enabled;
        self
    }

    /// Add `conn` to `room_id`, leaving any other room first.
    ///
    /// The joiner receives `document-loaded`, then every member (joiner
    /// included) receives `users-in-room`.
    pub async fn join(
        &self,
        room_id: &str,
        conn: ConnectionId,
        identity: UserIdentity,
        outbox: Outbox,
    ) -> Result<JoinOutcome, JoinError> {
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(JoinError::InvalidRoomId);
        }

        if let Some(previous) = self.room_of(&conn) {
            if previous != room_id {
                debug!("Connection {conn} switching from '{previous}' to '{room_id}'");
                self.leave(conn).await;
            }
        }

        loop {
            let room = self.get_or_insert(room_id);
            let mut state = room.state.lock().await;
            if state.evicted {
                continue;
            }

            let snapshot = match state.snapshot.clone() {
                Some(snapshot) => snapshot,
                None => match self.loader.load(room_id).await {
                    Ok(loaded) => {
                        state.snapshot = Some(loaded.snapshot.clone());
                        state.last_checkpoint_at = loaded.last_saved;
                        loaded.snapshot
                    }
                    Err(e) => {
                        error!("Failed to load room '{room_id}': {e}");
                        if state.members.is_empty() {
                            state.evicted = true;
                            self.remove_room(&room);
                        }
                        return Err(JoinError::Storage(e));
                    }
                },
            };

            state.add_member(conn, identity.clone(), outbox.clone());
            self.connections
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(conn, room_id.to_string());

            deliver(
                &outbox,
                Arc::new(ServerEvent::DocumentLoaded(snapshot.clone())),
                &self.stats,
            );
            let members = presence::announce(&state, &self.stats);

            info!(
                "{} joined room '{room_id}' ({} members)",
                identity.display_name,
                members.len()
            );
            return Ok(JoinOutcome {
                room_id: room_id.to_string(),
                snapshot,
                members,
            });
        }
    }

    /// Remove `conn` from its room, evicting the room if it is now empty.
    ///
    /// Returns the room left, or `None` if the connection was in no room.
    /// Calling it twice is harmless.
    pub async fn leave(&self, conn: ConnectionId) -> Option<String> {
        let room_id = self
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&conn)?;
        let room = self.room(&room_id)?;

        let _flush = if self.checkpoint_on_evict {
            Some(room.checkpoint_lock.lock().await)
        } else {
            None
        };
        let mut state = room.state.lock().await;
        let member = state.remove_member(&conn)?;

        if state.members.is_empty() {
            if self.checkpoint_on_evict {
                let outcome = self.checkpointer.flush_locked(&room_id, &mut state).await;
                if let CheckpointOutcome::Failed(e) = outcome {
                    warn!("Room '{room_id}' evicted with unsaved edits: {e}");
                }
            }
            state.evicted = true;
            self.remove_room(&room);
            info!(
                "{} left room '{room_id}'; room evicted",
                member.identity.display_name
            );
        } else {
            let members = presence::announce(&state, &self.stats);
            info!(
                "{} left room '{room_id}' ({} members)",
                member.identity.display_name,
                members.len()
            );
        }
        Some(room_id)
    }

    /// Apply an edit from `conn` to its room and relay it to the other members.
    pub async fn apply_changes(
        &self,
        conn: ConnectionId,
        change: Delta,
    ) -> Result<Applied, ReconcileError> {
        let room = self.room_for(&conn).ok_or(ReconcileError::NotAMember)?;
        let mut state = room.state.lock().await;
        if state.evicted {
            return Err(ReconcileError::RoomUnavailable);
        }
        reconciler::apply(&mut state, conn, change, &self.stats)
    }

    /// Checkpoint the room `conn` belongs to. `None` if it is in no room.
    pub async fn checkpoint(
        &self,
        conn: ConnectionId,
        mode: CheckpointMode,
    ) -> Option<CheckpointOutcome> {
        let room = self.room_for(&conn)?;
        Some(self.checkpointer.checkpoint(&room, mode).await)
    }

    /// Send an `error` event to one connection. Returns `false` if its
    /// session is already gone.
    pub fn send_error(&self, outbox: &Outbox, message: impl Into<String>) -> bool {
        let delivered = deliver(outbox, Arc::new(ServerEvent::error(message)), &self.stats);
        if !delivered {
            debug!("Dropped error event for a closed session");
        }
        delivered
    }

    pub fn room(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room_id)
            .cloned()
    }

    pub fn room_of(&self, conn: &ConnectionId) -> Option<String> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conn)
            .cloned()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn broadcast_stats(&self) -> BroadcastStats {
        self.stats.snapshot()
    }

    fn room_for(&self, conn: &ConnectionId) -> Option<Arc<Room>> {
        let room_id = self.room_of(conn)?;
        self.room(&room_id)
    }

    fn get_or_insert(&self, room_id: &str) -> Arc<Room> {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                debug!("Creating room '{room_id}'");
                Arc::new(Room::new(room_id))
            })
            .clone()
    }

    /// Remove `room` from the map unless it has already been replaced.
    fn remove_room(&self, room: &Arc<Room>) {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        if rooms
            .get(room.id())
            .is_some_and(|current| Arc::ptr_eq(current, room))
        {
            rooms.remove(room.id());
        }
    }
}
