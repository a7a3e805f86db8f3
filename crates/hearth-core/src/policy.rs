//! Relationship policy: friend requests, friendships and blocks.
//!
//! Every function is a pure decision over a [`Snapshot`] that was loaded
//! with a [`Lookup::Pair`](crate::store::Lookup::Pair) for the users
//! involved.  A block in either direction overrides everything else.

use hearth_shared::events::{ChangeKind, EntityId, EntityKind};
use hearth_shared::{Block, Denial, FriendRequest, FriendRequestId, Friendship, UserId, UserPair};

use crate::plan::{Ctx, Plan};
use crate::store::{Snapshot, WriteOp};

/// Summary of a [`block`] decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockSummary {
    /// False when the block already existed.
    pub created: bool,
    pub removed_friendship: bool,
    pub removed_requests: usize,
}

fn require_users(snap: &Snapshot, actor: UserId, target: UserId) -> Result<(), Denial> {
    snap.user(actor)?;
    snap.user(target)?;
    Ok(())
}

pub fn send_friend_request(
    snap: &Snapshot,
    ctx: Ctx<'_>,
    actor: UserId,
    target: UserId,
) -> Result<Plan<FriendRequest>, Denial> {
    if actor == target {
        return Err(Denial::SelfTarget);
    }
    require_users(snap, actor, target)?;

    let pair = UserPair::new(actor, target);
    if snap.blocked_either(actor, target) {
        return Err(Denial::Blocked);
    }
    if snap.friendship(pair).is_some() {
        return Err(Denial::AlreadyFriends);
    }
    if snap.requests_between(pair).next().is_some() {
        return Err(Denial::RequestPending);
    }

    let request = FriendRequest {
        id: FriendRequestId::new(),
        sender: actor,
        receiver: target,
        created_at: ctx.now,
    };
    let mut plan = Plan::new(request.clone());
    plan.write(WriteOp::PutFriendRequest(request.clone())).event(
        EntityKind::FriendRequest,
        EntityId::FriendRequest(request.id),
        ChangeKind::Created,
    );
    Ok(plan)
}

/// Accept or decline.  Returns the new friendship on accept.
pub fn respond_to_friend_request(
    snap: &Snapshot,
    ctx: Ctx<'_>,
    actor: UserId,
    request_id: FriendRequestId,
    accept: bool,
) -> Result<Plan<Option<Friendship>>, Denial> {
    let request = snap.request(request_id)?;
    if request.receiver != actor {
        return Err(Denial::NotRequestReceiver);
    }
    let pair = request.pair();

    if !accept {
        let mut plan = Plan::new(None);
        discard_request(&mut plan, request);
        return Ok(plan);
    }

    // Requests are dissolved on block, so this only trips on a store that
    // was written around the engine.
    if snap.blocked_either(request.sender, request.receiver) {
        return Err(Denial::Blocked);
    }

    let friendship = Friendship {
        pair,
        since: ctx.now,
    };
    let mut plan = Plan::new(Some(friendship.clone()));
    discard_request(&mut plan, request);
    plan.write(WriteOp::PutFriendship(friendship)).event(
        EntityKind::Friendship,
        EntityId::Pair(pair),
        ChangeKind::Created,
    );
    Ok(plan)
}

pub fn revoke_friend_request(
    snap: &Snapshot,
    actor: UserId,
    request_id: FriendRequestId,
) -> Result<Plan<()>, Denial> {
    let request = snap.request(request_id)?;
    if request.sender != actor {
        return Err(Denial::NotRequestSender);
    }
    let mut plan = Plan::new(());
    discard_request(&mut plan, request);
    Ok(plan)
}

pub fn unfriend(snap: &Snapshot, actor: UserId, target: UserId) -> Result<Plan<()>, Denial> {
    let pair = UserPair::new(actor, target);
    if snap.friendship(pair).is_none() {
        return Err(Denial::FriendshipNotFound);
    }
    let mut plan = Plan::new(());
    plan.write(WriteOp::DeleteFriendship(pair)).event(
        EntityKind::Friendship,
        EntityId::Pair(pair),
        ChangeKind::Deleted,
    );
    Ok(plan)
}

/// Block `target`.  Dissolves any friendship and any request between the
/// pair first.  Re-blocking succeeds without writing anything.
pub fn block(
    snap: &Snapshot,
    ctx: Ctx<'_>,
    actor: UserId,
    target: UserId,
) -> Result<Plan<BlockSummary>, Denial> {
    if actor == target {
        return Err(Denial::SelfTarget);
    }
    require_users(snap, actor, target)?;

    let pair = UserPair::new(actor, target);
    let mut summary = BlockSummary::default();
    let mut plan = Plan::new(summary);

    if snap.friendship(pair).is_some() {
        summary.removed_friendship = true;
        plan.write(WriteOp::DeleteFriendship(pair)).event(
            EntityKind::Friendship,
            EntityId::Pair(pair),
            ChangeKind::Deleted,
        );
    }
    for request in snap.requests_between(pair) {
        summary.removed_requests += 1;
        discard_request(&mut plan, request);
    }
    if snap.block(actor, target).is_none() {
        summary.created = true;
        plan.write(WriteOp::PutBlock(Block {
            blocker: actor,
            blocked: target,
            created_at: ctx.now,
        }))
        .event(EntityKind::Block, EntityId::Pair(pair), ChangeKind::Created);
    }

    plan.value = summary;
    Ok(plan)
}

pub fn unblock(snap: &Snapshot, actor: UserId, target: UserId) -> Result<Plan<()>, Denial> {
    if snap.block(actor, target).is_none() {
        if snap.block(target, actor).is_some() {
            return Err(Denial::NotBlocker);
        }
        return Err(Denial::BlockNotFound);
    }
    let mut plan = Plan::new(());
    plan.write(WriteOp::DeleteBlock {
        blocker: actor,
        blocked: target,
    })
    .event(
        EntityKind::Block,
        EntityId::Pair(UserPair::new(actor, target)),
        ChangeKind::Deleted,
    );
    Ok(plan)
}

fn discard_request<T>(plan: &mut Plan<T>, request: &FriendRequest) {
    plan.write(WriteOp::DeleteFriendRequest {
        id: request.id,
        pair: request.pair(),
    })
    .event(
        EntityKind::FriendRequest,
        EntityId::FriendRequest(request.id),
        ChangeKind::Deleted,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use chrono::Utc;
    use hearth_shared::{DenialKind, User};

    struct Fixture {
        snap: Snapshot,
        a: UserId,
        b: UserId,
        config: EngineConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let mut snap = Snapshot::default();
            let a = User::new("a");
            let b = User::new("b");
            let ids = (a.id, b.id);
            snap.users.insert(a.id, a);
            snap.users.insert(b.id, b);
            Self {
                snap,
                a: ids.0,
                b: ids.1,
                config: EngineConfig::default(),
            }
        }

        fn ctx(&self) -> Ctx<'_> {
            Ctx {
                now: Utc::now(),
                config: &self.config,
            }
        }

        /// Apply a plan's writes to the fixture snapshot.
        fn apply<T>(&mut self, plan: &Plan<T>) {
            for op in &plan.ops {
                match op {
                    WriteOp::PutFriendRequest(r) => {
                        self.snap.requests.insert(r.id, r.clone());
                    }
                    WriteOp::DeleteFriendRequest { id, .. } => {
                        self.snap.requests.remove(id);
                    }
                    WriteOp::PutFriendship(f) => {
                        self.snap.friendships.insert(f.pair, f.clone());
                    }
                    WriteOp::DeleteFriendship(pair) => {
                        self.snap.friendships.remove(pair);
                    }
                    WriteOp::PutBlock(b) => {
                        self.snap.blocks.insert((b.blocker, b.blocked), b.clone());
                    }
                    WriteOp::DeleteBlock { blocker, blocked } => {
                        self.snap.blocks.remove(&(*blocker, *blocked));
                    }
                    other => panic!("unexpected op {other:?}"),
                }
            }
        }
    }

    #[test]
    fn self_request_is_denied() {
        let f = Fixture::new();
        let err = send_friend_request(&f.snap, f.ctx(), f.a, f.a).unwrap_err();
        assert_eq!(err, Denial::SelfTarget);
    }

    #[test]
    fn duplicate_request_in_either_direction_is_denied() {
        let mut f = Fixture::new();
        let plan = send_friend_request(&f.snap, f.ctx(), f.a, f.b).unwrap();
        f.apply(&plan);

        assert_eq!(
            send_friend_request(&f.snap, f.ctx(), f.a, f.b).unwrap_err(),
            Denial::RequestPending
        );
        assert_eq!(
            send_friend_request(&f.snap, f.ctx(), f.b, f.a).unwrap_err(),
            Denial::RequestPending
        );
    }

    #[test]
    fn only_receiver_may_respond_and_only_sender_may_revoke() {
        let mut f = Fixture::new();
        let plan = send_friend_request(&f.snap, f.ctx(), f.a, f.b).unwrap();
        let id = plan.value.id;
        f.apply(&plan);

        assert_eq!(
            respond_to_friend_request(&f.snap, f.ctx(), f.a, id, true).unwrap_err(),
            Denial::NotRequestReceiver
        );
        assert_eq!(
            revoke_friend_request(&f.snap, f.b, id).unwrap_err(),
            Denial::NotRequestSender
        );

        let plan = respond_to_friend_request(&f.snap, f.ctx(), f.b, id, true).unwrap();
        assert!(plan.value.is_some());
        f.apply(&plan);
        assert!(f.snap.requests.is_empty());
        assert_eq!(
            send_friend_request(&f.snap, f.ctx(), f.b, f.a).unwrap_err(),
            Denial::AlreadyFriends
        );
    }

    #[test]
    fn decline_discards_request_without_friendship() {
        let mut f = Fixture::new();
        let plan = send_friend_request(&f.snap, f.ctx(), f.a, f.b).unwrap();
        let id = plan.value.id;
        f.apply(&plan);

        let plan = respond_to_friend_request(&f.snap, f.ctx(), f.b, id, false).unwrap();
        assert_eq!(plan.value, None);
        f.apply(&plan);
        assert!(f.snap.requests.is_empty());
        assert!(f.snap.friendships.is_empty());
    }

    #[test]
    fn second_accept_finds_no_request() {
        let mut f = Fixture::new();
        let plan = send_friend_request(&f.snap, f.ctx(), f.a, f.b).unwrap();
        let id = plan.value.id;
        f.apply(&plan);
        let plan = respond_to_friend_request(&f.snap, f.ctx(), f.b, id, true).unwrap();
        f.apply(&plan);

        let err = respond_to_friend_request(&f.snap, f.ctx(), f.b, id, true).unwrap_err();
        assert_eq!(err, Denial::RequestNotFound);
        assert_eq!(err.kind(), DenialKind::NotFound);
        assert_eq!(f.snap.friendships.len(), 1);
    }

    #[test]
    fn block_dissolves_friendship_and_requests_and_is_idempotent() {
        let mut f = Fixture::new();
        let pair = UserPair::new(f.a, f.b);
        f.snap.friendships.insert(
            pair,
            Friendship {
                pair,
                since: Utc::now(),
            },
        );
        let stale = FriendRequest {
            id: FriendRequestId::new(),
            sender: f.b,
            receiver: f.a,
            created_at: Utc::now(),
        };
        f.snap.requests.insert(stale.id, stale);

        let plan = block(&f.snap, f.ctx(), f.a, f.b).unwrap();
        assert_eq!(
            plan.value,
            BlockSummary {
                created: true,
                removed_friendship: true,
                removed_requests: 1
            }
        );
        f.apply(&plan);
        assert!(f.snap.friendships.is_empty());
        assert!(f.snap.requests.is_empty());

        let again = block(&f.snap, f.ctx(), f.a, f.b).unwrap();
        assert!(again.is_noop());
        assert!(!again.value.created);
    }

    #[test]
    fn block_takes_precedence_over_requests() {
        let mut f = Fixture::new();
        let plan = block(&f.snap, f.ctx(), f.b, f.a).unwrap();
        f.apply(&plan);
        assert_eq!(
            send_friend_request(&f.snap, f.ctx(), f.a, f.b).unwrap_err(),
            Denial::Blocked
        );
        assert_eq!(
            send_friend_request(&f.snap, f.ctx(), f.b, f.a).unwrap_err(),
            Denial::Blocked
        );
    }

    #[test]
    fn unblock_requires_blocker() {
        let mut f = Fixture::new();
        assert_eq!(unblock(&f.snap, f.a, f.b).unwrap_err(), Denial::BlockNotFound);

        let plan = block(&f.snap, f.ctx(), f.a, f.b).unwrap();
        f.apply(&plan);
        assert_eq!(unblock(&f.snap, f.b, f.a).unwrap_err(), Denial::NotBlocker);

        let plan = unblock(&f.snap, f.a, f.b).unwrap();
        f.apply(&plan);
        assert!(f.snap.blocks.is_empty());
    }

    #[test]
    fn unfriend_requires_friendship() {
        let f = Fixture::new();
        assert_eq!(unfriend(&f.snap, f.a, f.b).unwrap_err(), Denial::FriendshipNotFound);
    }
}
