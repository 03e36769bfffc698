//! Room membership announcements.
//!
//! After every join and every leave that does not empty the room, all
//! members receive the complete member list (`users-in-room`), ordered by
//! join time. Callers invoke [`announce`] only once the membership change is
//! recorded, so a joiner always finds itself in the list it receives.

use crate::broadcast::{fan_out, AtomicBroadcastStats};
use crate::protocol::{ServerEvent, UserIdentity};
use crate::room::RoomState;

/// Members of the room in join order.
pub fn member_list(state: &RoomState) -> Vec<UserIdentity> {
    let mut members: Vec<_> = state.members.values().collect();
    members.sort_by_key(|member| member.joined_seq);
    members
        .into_iter()
        .map(|member| member.identity.clone())
        .collect()
}

/// Send the current member list to every member. Returns the list sent.
pub fn announce(state: &RoomState, stats: &AtomicBroadcastStats) -> Vec<UserIdentity> {
    let members = member_list(state);
    fan_out(
        state.recipients(),
        None,
        ServerEvent::UsersInRoom(members.clone()),
        stats,
    );
    members
}
