//! Read side of the social graph: relationship classification and the list
//! queries behind friends / requests / block screens.

use hearth_shared::{FriendRequest, Relationship, User, UserId, UserPair};

use crate::store::Snapshot;

/// Classify how `viewer` relates to `other`.  Blocks take precedence over
/// every other edge, then friendship, then pending requests.
pub fn relationship(snap: &Snapshot, viewer: UserId, other: UserId) -> Relationship {
    if viewer == other {
        return Relationship::Myself;
    }
    if snap.block(viewer, other).is_some() {
        return Relationship::Blocked;
    }
    if snap.block(other, viewer).is_some() {
        return Relationship::BlockedBy;
    }
    if snap.friendship(UserPair::new(viewer, other)).is_some() {
        return Relationship::Friend;
    }
    if snap.request_from(viewer, other).is_some() {
        return Relationship::PendingOutgoing;
    }
    if snap.request_from(other, viewer).is_some() {
        return Relationship::PendingIncoming;
    }
    Relationship::None
}

/// Messaging is possible iff no block exists in either direction.
pub fn can_direct_message(snap: &Snapshot, a: UserId, b: UserId) -> bool {
    !snap.blocked_either(a, b)
}

pub fn friends_of(snap: &Snapshot, user: UserId) -> Vec<User> {
    let mut friends: Vec<User> = snap
        .friendships
        .keys()
        .filter_map(|pair| pair.other(user))
        .filter_map(|id| snap.users.get(&id).cloned())
        .collect();
    sort_by_name(&mut friends);
    friends
}

pub fn incoming_requests(snap: &Snapshot, user: UserId) -> Vec<FriendRequest> {
    let mut requests: Vec<_> = snap
        .requests
        .values()
        .filter(|r| r.receiver == user)
        .cloned()
        .collect();
    requests.sort_by_key(|r| r.created_at);
    requests
}

pub fn outgoing_requests(snap: &Snapshot, user: UserId) -> Vec<FriendRequest> {
    let mut requests: Vec<_> = snap
        .requests
        .values()
        .filter(|r| r.sender == user)
        .cloned()
        .collect();
    requests.sort_by_key(|r| r.created_at);
    requests
}

/// Users `user` has blocked.
pub fn blocked_by(snap: &Snapshot, user: UserId) -> Vec<User> {
    let mut blocked: Vec<User> = snap
        .blocks
        .keys()
        .filter(|(blocker, _)| *blocker == user)
        .filter_map(|(_, blocked)| snap.users.get(blocked).cloned())
        .collect();
    sort_by_name(&mut blocked);
    blocked
}

fn sort_by_name(users: &mut [User]) {
    users.sort_by(|a, b| a.name().to_lowercase().cmp(&b.name().to_lowercase()));
}
