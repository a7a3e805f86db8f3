//! Command facade.
//!
//! Every command follows the same cycle: read a snapshot, decide, commit
//! the write guarded by the revisions the decision was based on.  When the
//! store reports a conflict, the whole cycle runs again against fresh state,
//! so the loser of a race sees the precondition that now fails.

use std::sync::Arc;

use tracing::{debug, info, warn};

use hearth_shared::events::{emit_all, EventSink, NullSink};
use hearth_shared::{
    Chat, ChatId, Denial, FriendRequest, FriendRequestId, Friendship, GroupInvite, InviteId,
    Message, MessageId, Relationship, Role, User, UserId, UserPair,
};

use crate::chat::{self as chats, GroupSettings, LeaveSummary};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::graph;
use crate::message;
use crate::plan::{Ctx, Plan};
use crate::policy::{self, BlockSummary};
use crate::profile::{self, ProfileUpdate};
use crate::store::{AtomicWrite, CommitOutcome, IdentityResolver, Lookup, Snapshot, Store};

/// Decision bound to the revisions it was taken on.
struct Staged<T> {
    snap: Snapshot,
    plan: Plan<T>,
}

fn stage<T>(snap: Snapshot, decision: Result<Plan<T>, Denial>) -> CoreResult<Staged<T>> {
    Ok(Staged {
        plan: decision?,
        snap,
    })
}

pub struct Engine<S: Store> {
    store: Arc<S>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

impl<S: Store> Engine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(SystemClock),
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn load(&self, lookups: &[Lookup]) -> CoreResult<Snapshot> {
        Ok(self.store.snapshot(lookups)?)
    }

    /// Read, decide, commit; start over on conflict.
    fn run<T>(
        &self,
        action: &'static str,
        actor: UserId,
        mut attempt: impl FnMut(Ctx<'_>) -> CoreResult<Staged<T>>,
    ) -> CoreResult<T> {
        let attempts = self.config.max_commit_retries.saturating_add(1);
        for n in 1..=attempts {
            let ctx = Ctx {
                now: self.clock.now(),
                config: &self.config,
            };
            let staged = match attempt(ctx) {
                Ok(staged) => staged,
                Err(CoreError::Denied(denial)) => {
                    debug!(action, actor = %actor, %denial, "Denied");
                    return Err(denial.into());
                }
                Err(e) => return Err(e),
            };
            let Staged { snap, plan } = staged;
            if plan.is_noop() {
                debug!(action, actor = %actor, "Nothing to write");
                return Ok(plan.value);
            }

            let write = AtomicWrite {
                expected: snap.revisions,
                ops: plan.ops,
            };
            match self.store.commit(&write)? {
                CommitOutcome::Committed => {
                    info!(action, actor = %actor, writes = write.ops.len(), "Committed");
                    emit_all(self.sink.as_ref(), &plan.events);
                    return Ok(plan.value);
                }
                CommitOutcome::Conflict => {
                    debug!(action, actor = %actor, attempt = n, "Conflict, re-validating");
                }
            }
        }
        warn!(action, actor = %actor, attempts, "Giving up after repeated conflicts");
        Err(Denial::Conflict(attempts).into())
    }

    // -----------------------------------------------------------------------
    // Relationship policy
    // -----------------------------------------------------------------------

    pub fn send_friend_request(&self, actor: UserId, target: UserId) -> CoreResult<FriendRequest> {
        let lookups = [Lookup::Pair(UserPair::new(actor, target))];
        self.run("send_friend_request", actor, |ctx| {
            let snap = self.load(&lookups)?;
            let decision = policy::send_friend_request(&snap, ctx, actor, target);
            stage(snap, decision)
        })
    }

    pub fn respond_to_friend_request(
        &self,
        actor: UserId,
        request: FriendRequestId,
        accept: bool,
    ) -> CoreResult<Option<Friendship>> {
        let lookups = [Lookup::FriendRequest(request)];
        self.run("respond_to_friend_request", actor, |ctx| {
            let snap = self.load(&lookups)?;
            let decision = policy::respond_to_friend_request(&snap, ctx, actor, request, accept);
            stage(snap, decision)
        })
    }

    pub fn revoke_friend_request(&self, actor: UserId, request: FriendRequestId) -> CoreResult<()> {
        let lookups = [Lookup::FriendRequest(request)];
        self.run("revoke_friend_request", actor, |_| {
            let snap = self.load(&lookups)?;
            let decision = policy::revoke_friend_request(&snap, actor, request);
            stage(snap, decision)
        })
    }

    pub fn unfriend(&self, actor: UserId, target: UserId) -> CoreResult<()> {
        let lookups = [Lookup::Pair(UserPair::new(actor, target))];
        self.run("unfriend", actor, |_| {
            let snap = self.load(&lookups)?;
            let decision = policy::unfriend(&snap, actor, target);
            stage(snap, decision)
        })
    }

    pub fn block(&self, actor: UserId, target: UserId) -> CoreResult<BlockSummary> {
        let lookups = [Lookup::Pair(UserPair::new(actor, target))];
        self.run("block", actor, |ctx| {
            let snap = self.load(&lookups)?;
            let decision = policy::block(&snap, ctx, actor, target);
            stage(snap, decision)
        })
    }

    pub fn unblock(&self, actor: UserId, target: UserId) -> CoreResult<()> {
        let lookups = [Lookup::Pair(UserPair::new(actor, target))];
        self.run("unblock", actor, |_| {
            let snap = self.load(&lookups)?;
            let decision = policy::unblock(&snap, actor, target);
            stage(snap, decision)
        })
    }

    pub fn get_relationship(&self, viewer: UserId, other: UserId) -> CoreResult<Relationship> {
        let snap = self.load(&[Lookup::Pair(UserPair::new(viewer, other))])?;
        Ok(graph::relationship(&snap, viewer, other))
    }

    pub fn can_direct_message(&self, a: UserId, b: UserId) -> CoreResult<bool> {
        let snap = self.load(&[Lookup::Pair(UserPair::new(a, b))])?;
        Ok(graph::can_direct_message(&snap, a, b))
    }

    pub fn friends_of(&self, user: UserId) -> CoreResult<Vec<User>> {
        let snap = self.load(&[Lookup::UserGraph(user)])?;
        Ok(graph::friends_of(&snap, user))
    }

    pub fn incoming_requests(&self, user: UserId) -> CoreResult<Vec<FriendRequest>> {
        let snap = self.load(&[Lookup::UserGraph(user)])?;
        Ok(graph::incoming_requests(&snap, user))
    }

    pub fn outgoing_requests(&self, user: UserId) -> CoreResult<Vec<FriendRequest>> {
        let snap = self.load(&[Lookup::UserGraph(user)])?;
        Ok(graph::outgoing_requests(&snap, user))
    }

    pub fn blocked_users(&self, user: UserId) -> CoreResult<Vec<User>> {
        let snap = self.load(&[Lookup::UserGraph(user)])?;
        Ok(graph::blocked_by(&snap, user))
    }

    // -----------------------------------------------------------------------
    // Chats
    // -----------------------------------------------------------------------

    pub fn create_direct_chat(&self, a: UserId, b: UserId) -> CoreResult<Chat> {
        let lookups = [Lookup::Pair(UserPair::new(a, b))];
        self.run("create_direct_chat", a, |ctx| {
            let snap = self.load(&lookups)?;
            let decision = chats::create_direct_chat(&snap, ctx, a, b);
            stage(snap, decision)
        })
    }

    /// The direct chat between `a` and `b`, created on first use.
    pub fn open_direct_chat(&self, a: UserId, b: UserId) -> CoreResult<Chat> {
        match self.create_direct_chat(a, b) {
            Err(CoreError::Denied(Denial::DirectChatExists(id))) => self.get_chat(id),
            other => other,
        }
    }

    pub fn create_group_chat(
        &self,
        owner: UserId,
        name: &str,
        initial_members: &[UserId],
    ) -> CoreResult<Chat> {
        let mut lookups = vec![Lookup::User(owner)];
        lookups.extend(
            initial_members
                .iter()
                .filter(|&&m| m != owner)
                .map(|&m| Lookup::Pair(UserPair::new(owner, m))),
        );
        self.run("create_group_chat", owner, |ctx| {
            let snap = self.load(&lookups)?;
            let decision = chats::create_group_chat(&snap, ctx, owner, name, initial_members);
            stage(snap, decision)
        })
    }

    pub fn invite_member(
        &self,
        actor: UserId,
        chat: ChatId,
        invitee: UserId,
    ) -> CoreResult<GroupInvite> {
        let lookups = [
            Lookup::Chat(chat),
            Lookup::Pair(UserPair::new(actor, invitee)),
        ];
        self.run("invite_member", actor, |ctx| {
            let snap = self.load(&lookups)?;
            let decision = chats::invite_member(&snap, ctx, actor, chat, invitee);
            stage(snap, decision)
        })
    }

    pub fn respond_to_invite(
        &self,
        actor: UserId,
        invite: InviteId,
        accept: bool,
    ) -> CoreResult<Option<Chat>> {
        let lookups = [Lookup::Invite(invite)];
        self.run("respond_to_invite", actor, |ctx| {
            let snap = self.load(&lookups)?;
            let decision = chats::respond_to_invite(&snap, ctx, actor, invite, accept);
            stage(snap, decision)
        })
    }

    pub fn revoke_invite(&self, actor: UserId, invite: InviteId) -> CoreResult<()> {
        let lookups = [Lookup::Invite(invite)];
        self.run("revoke_invite", actor, |_| {
            let snap = self.load(&lookups)?;
            let decision = chats::revoke_invite(&snap, actor, invite);
            stage(snap, decision)
        })
    }

    pub fn remove_member(&self, actor: UserId, chat: ChatId, target: UserId) -> CoreResult<()> {
        let lookups = [Lookup::Chat(chat)];
        self.run("remove_member", actor, |_| {
            let snap = self.load(&lookups)?;
            let decision = chats::remove_member(&snap, actor, chat, target);
            stage(snap, decision)
        })
    }

    pub fn leave_chat(&self, actor: UserId, chat: ChatId) -> CoreResult<LeaveSummary> {
        let lookups = [Lookup::Chat(chat)];
        self.run("leave_chat", actor, |_| {
            let snap = self.load(&lookups)?;
            let decision = chats::leave_chat(&snap, actor, chat);
            stage(snap, decision)
        })
    }

    pub fn set_moderator(
        &self,
        actor: UserId,
        chat: ChatId,
        target: UserId,
        is_mod: bool,
    ) -> CoreResult<()> {
        let lookups = [Lookup::Chat(chat)];
        self.run("set_moderator", actor, |_| {
            let snap = self.load(&lookups)?;
            let decision = chats::set_moderator(&snap, actor, chat, target, is_mod);
            stage(snap, decision)
        })
    }

    pub fn update_group_settings(
        &self,
        actor: UserId,
        chat: ChatId,
        settings: &GroupSettings,
    ) -> CoreResult<Chat> {
        let lookups = [Lookup::Chat(chat)];
        self.run("update_group_settings", actor, |ctx| {
            let snap = self.load(&lookups)?;
            let decision = chats::update_group_settings(&snap, ctx, actor, chat, settings);
            stage(snap, decision)
        })
    }

    pub fn get_chat(&self, chat: ChatId) -> CoreResult<Chat> {
        let snap = self.load(&[Lookup::Chat(chat)])?;
        Ok(snap.chat(chat)?.clone())
    }

    pub fn chat_membership(&self, chat: ChatId) -> CoreResult<Vec<(UserId, Role)>> {
        let snap = self.load(&[Lookup::Chat(chat)])?;
        Ok(chats::membership(snap.chat(chat)?))
    }

    /// Active chats of `user`, most recently active first.
    pub fn chats_for(&self, user: UserId) -> CoreResult<Vec<Chat>> {
        let snap = self.load(&[Lookup::UserChats(user)])?;
        let mut list: Vec<Chat> = snap.chats.into_values().collect();
        list.sort_by(|a, b| {
            let last = |c: &Chat| c.last_sent_at.unwrap_or(c.created_at);
            last(b).cmp(&last(a)).then(a.id.cmp(&b.id))
        });
        Ok(list)
    }

    pub fn invitable_groups(&self, actor: UserId, target: UserId) -> CoreResult<Vec<Chat>> {
        let snap = self.load(&[
            Lookup::UserChats(actor),
            Lookup::Pair(UserPair::new(actor, target)),
        ])?;
        Ok(chats::invitable_groups(&snap, actor, target))
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    pub fn send_message(&self, actor: UserId, chat: ChatId, content: &str) -> CoreResult<Message> {
        let lookups = [Lookup::Chat(chat)];
        self.run("send_message", actor, |ctx| {
            let snap = self.load(&lookups)?;
            let decision = message::send(&snap, ctx, actor, chat, content);
            stage(snap, decision)
        })
    }

    pub fn edit_message(
        &self,
        actor: UserId,
        id: MessageId,
        content: &str,
    ) -> CoreResult<Message> {
        let lookups = [Lookup::Message(id)];
        self.run("edit_message", actor, |ctx| {
            let snap = self.load(&lookups)?;
            let decision = message::edit(&snap, ctx, actor, id, content);
            stage(snap, decision)
        })
    }

    pub fn delete_message(&self, actor: UserId, id: MessageId) -> CoreResult<Message> {
        let lookups = [Lookup::Message(id)];
        self.run("delete_message", actor, |ctx| {
            let snap = self.load(&lookups)?;
            let decision = message::delete(&snap, ctx, actor, id);
            stage(snap, decision)
        })
    }

    /// Returns the message that lost its pin, if any.
    pub fn pin_message(
        &self,
        actor: UserId,
        id: MessageId,
        pinned: bool,
    ) -> CoreResult<Option<MessageId>> {
        let lookups = [Lookup::Message(id)];
        self.run("pin_message", actor, |_| {
            let snap = self.load(&lookups)?;
            let decision = message::pin(&snap, actor, id, pinned);
            stage(snap, decision)
        })
    }

    pub fn messages(&self, actor: UserId, chat: ChatId) -> CoreResult<Vec<Message>> {
        let snap = self.load(&[Lookup::ChatMessages(chat)])?;
        Ok(message::list(&snap, actor, chat)?)
    }

    // -----------------------------------------------------------------------
    // Profile
    // -----------------------------------------------------------------------

    pub fn update_profile(&self, actor: UserId, update: &ProfileUpdate) -> CoreResult<User> {
        let lookups = [Lookup::User(actor)];
        self.run("update_profile", actor, |ctx| {
            let snap = self.load(&lookups)?;
            let decision = profile::update_profile(&snap, ctx, actor, update);
            stage(snap, decision)
        })
    }

    pub fn get_user(&self, id: UserId) -> CoreResult<User> {
        let snap = self.load(&[Lookup::User(id)])?;
        Ok(snap.user(id)?.clone())
    }
}

impl<S: Store + IdentityResolver> Engine<S> {
    /// Map an authenticated principal to the acting user.
    pub fn resolve_actor(&self, principal: &str) -> CoreResult<UserId> {
        match self.store.resolve(principal)? {
            Some(user) => Ok(user.id),
            None => {
                debug!(principal, "Unknown principal");
                Err(Denial::UnknownPrincipal.into())
            }
        }
    }
}
