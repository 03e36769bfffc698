//! Applies edits to a room's snapshot and relays them to peers.
//!
//! Edits are applied strictly in the order the room lock grants access, and
//! each one is composed onto whatever snapshot is current at that moment.
//! There is no transformation against concurrent edits: two clients editing
//! the same region at once resolve as "last applied wins".

use log::debug;

use crate::broadcast::{fan_out, AtomicBroadcastStats};
use crate::delta::{Delta, DeltaError};
use crate::protocol::{ConnectionId, ServerEvent};
use crate::room::RoomState;

/// Result of a successfully applied edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// Room revision after the edit.
    pub revision: u64,
    /// Peers the edit was relayed to.
    pub relayed_to: usize,
}

/// Compose `change` onto the room snapshot and relay it verbatim to every
/// member except `origin`. The caller must hold the room lock.
pub fn apply(
    state: &mut RoomState,
    origin: ConnectionId,
    change: Delta,
    stats: &AtomicBroadcastStats,
) -> Result<Applied, ReconcileError> {
    if !state.is_member(&origin) {
        return Err(ReconcileError::NotAMember);
    }
    let snapshot = state.snapshot.as_ref().ok_or(ReconcileError::RoomUnavailable)?;
    let next = snapshot.apply(&change)?;

    state.snapshot = Some(next);
    state.revision += 1;

    let relayed_to = fan_out(
        state.recipients(),
        Some(origin),
        ServerEvent::ReceiveChanges(change),
        stats,
    );
    debug!(
        "Applied edit from {origin} (revision {}, relayed to {relayed_to})",
        state.revision
    );

    Ok(Applied {
        revision: state.revision,
        relayed_to,
    })
}

/// Reasons an edit is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("Connection is not a member of any room")]
    NotAMember,
    #[error("Room is not available")]
    RoomUnavailable,
    #[error("Edit rejected: {0}")]
    Rejected(#[from] DeltaError),
}
