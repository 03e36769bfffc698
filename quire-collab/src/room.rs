//! Per-room state.
//!
//! A room moves through three states:
//! ```text
//!   created (snapshot = None) ──load──► live (≥1 member) ──last leave──► evicted
//!                 │                                                       ▲
//!                 └──────────── load failed, nobody joined ───────────────┘
//! ```
//! An evicted room is already gone from the registry; anyone still holding
//! the `Arc` must look the id up again.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::broadcast::Outbox;
use crate::delta::Delta;
use crate::protocol::{ConnectionId, UserIdentity};

/// A live connection inside a room.
#[derive(Debug, Clone)]
pub struct Member {
    pub identity: UserIdentity,
    pub outbox: Outbox,
    /// Join sequence number; presence lists are ordered by it.
    pub joined_seq: u64,
}

/// Everything guarded by the room lock.
#[derive(Debug, Default)]
pub struct RoomState {
    /// `None` until the loader has produced the initial snapshot.
    pub(crate) snapshot: Option<Delta>,
    pub(crate) members: HashMap<ConnectionId, Member>,
    /// Bumped on every applied edit.
    pub(crate) revision: u64,
    /// Revision of the last snapshot handed to a successful checkpoint.
    pub(crate) checkpointed_revision: u64,
    /// `lastSaved` of the latest checkpoint or of the loaded record.
    pub(crate) last_checkpoint_at: Option<u64>,
    pub(crate) evicted: bool,
    pub(crate) next_seq: u64,
}

impl RoomState {
    pub fn snapshot(&self) -> Option<&Delta> {
        self.snapshot.as_ref()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_member(&self, conn: &ConnectionId) -> bool {
        self.members.contains_key(conn)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn last_checkpoint_at(&self) -> Option<u64> {
        self.last_checkpoint_at
    }

    /// Edits have been applied since the last checkpoint.
    pub fn is_dirty(&self) -> bool {
        self.revision > self.checkpointed_revision
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted
    }

    /// Insert or refresh a member. A connection that rejoins keeps its
    /// original position in the presence order.
    pub(crate) fn add_member(&mut self, conn: ConnectionId, identity: UserIdentity, outbox: Outbox) {
        let joined_seq = match self.members.get(&conn) {
            Some(existing) => existing.joined_seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.members.insert(
            conn,
            Member {
                identity,
                outbox,
                joined_seq,
            },
        );
    }

    pub(crate) fn remove_member(&mut self, conn: &ConnectionId) -> Option<Member> {
        self.members.remove(conn)
    }

    pub(crate) fn recipients(&self) -> impl Iterator<Item = (&ConnectionId, &Outbox)> {
        self.members.iter().map(|(conn, member)| (conn, &member.outbox))
    }
}

/// One collaborative editing session.
#[derive(Debug)]
pub struct Room {
    id: String,
    pub(crate) state: Mutex<RoomState>,
    /// Held for the whole of a checkpoint write so writes land in order.
    pub(crate) checkpoint_lock: Mutex<()>,
}

impl Room {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(RoomState::default()),
            checkpoint_lock: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current snapshot, if the room has finished loading.
    pub async fn snapshot(&self) -> Option<Delta> {
        self.state.lock().await.snapshot.clone()
    }

    pub async fn member_count(&self) -> usize {
        self.state.lock().await.member_count()
    }

    pub async fn last_checkpoint_at(&self) -> Option<u64> {
        self.state.lock().await.last_checkpoint_at
    }

    pub async fn revision(&self) -> u64 {
        self.state.lock().await.revision
    }
}
