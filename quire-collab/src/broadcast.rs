//! Fan-out of server events to room members.
//!
//! Every connection owns one unbounded outbox. The room pushes an event into
//! each recipient's outbox while it still holds the room lock, so every
//! member observes events in the order the room produced them:
//!
//! ```text
//!            ┌──── Room (locked) ────┐
//! edit ───►  │ apply, then fan_out   │ ──► outbox A ──► session A ──► ws A
//!            │ (skip origin)         │ ──► outbox B ──► session B ──► ws B
//!            └───────────────────────┘
//! ```
//!
//! Events are shared as `Arc<ServerEvent>`; each session encodes on its own
//! task, so a slow socket never blocks the room.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::protocol::{ConnectionId, ServerEvent};

/// Sending half of a connection's event queue.
pub type Outbox = mpsc::UnboundedSender<Arc<ServerEvent>>;

/// Receiving half, drained by the connection's session loop.
pub type Inbox = mpsc::UnboundedReceiver<Arc<ServerEvent>>;

/// Create a connection's event queue.
pub fn outbox() -> (Outbox, Inbox) {
    mpsc::unbounded_channel()
}

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    /// Events addressed to a connection whose session already ended.
    pub messages_dropped: u64,
}

/// Lock-free counters behind [`BroadcastStats`].
#[derive(Debug, Default)]
pub struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl AtomicBroadcastStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Queue one event for one connection. Returns `false` if the session is gone.
pub fn deliver(outbox: &Outbox, event: Arc<ServerEvent>, stats: &AtomicBroadcastStats) -> bool {
    match outbox.send(event) {
        Ok(()) => {
            stats.messages_sent.fetch_add(1, Ordering::Relaxed);
            true
        }
        Err(_) => {
            stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }
}

/// Queue `event` for every recipient except `origin`.
///
/// Returns the number of outboxes that accepted the event.
pub fn fan_out<'a>(
    recipients: impl IntoIterator<Item = (&'a ConnectionId, &'a Outbox)>,
    origin: Option<ConnectionId>,
    event: ServerEvent,
    stats: &AtomicBroadcastStats,
) -> usize {
    let event = Arc::new(event);
    recipients
        .into_iter()
        .filter(|(conn, _)| Some(**conn) != origin)
        .filter(|(_, outbox)| deliver(outbox, Arc::clone(&event), stats))
        .count()
}
