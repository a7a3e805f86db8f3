//! Snapshot assembly shared by the bundled stores.
//!
//! A store only has to answer primitive reads; [`assemble`] expands each
//! [`Lookup`] into the entities and scope revisions it stands for.

use std::collections::BTreeSet;

use hearth_shared::{
    Block, Chat, ChatId, FriendRequest, FriendRequestId, Friendship, GroupInvite, InviteId,
    Message, MessageId, User, UserId, UserPair,
};

use crate::store::{Lookup, ScopeKey, Snapshot};

/// Every friendship, request and block touching one user.
#[derive(Debug, Clone, Default)]
pub struct Edges {
    pub friendships: Vec<Friendship>,
    pub requests: Vec<FriendRequest>,
    pub blocks: Vec<Block>,
}

/// Primitive reads a store must answer to build snapshots.
pub trait SnapshotSource {
    type Error;

    /// Current revision of a scope, 0 if it was never written.
    fn revision(&self, scope: ScopeKey) -> Result<u64, Self::Error>;
    fn user(&self, id: UserId) -> Result<Option<User>, Self::Error>;
    fn friendship(&self, pair: UserPair) -> Result<Option<Friendship>, Self::Error>;
    fn friend_request(&self, id: FriendRequestId) -> Result<Option<FriendRequest>, Self::Error>;
    fn requests_between(&self, pair: UserPair) -> Result<Vec<FriendRequest>, Self::Error>;
    fn block(&self, blocker: UserId, blocked: UserId) -> Result<Option<Block>, Self::Error>;
    fn direct_chat(&self, pair: UserPair) -> Result<Option<Chat>, Self::Error>;
    fn chat(&self, id: ChatId) -> Result<Option<Chat>, Self::Error>;
    fn invite(&self, id: InviteId) -> Result<Option<GroupInvite>, Self::Error>;
    fn invites_for_chat(&self, chat: ChatId) -> Result<Vec<GroupInvite>, Self::Error>;
    fn message(&self, id: MessageId) -> Result<Option<Message>, Self::Error>;
    fn edges_of(&self, user: UserId) -> Result<Edges, Self::Error>;
    /// Active chats with `user` as a member.
    fn active_chats_of(&self, user: UserId) -> Result<Vec<Chat>, Self::Error>;
    fn chat_messages(&self, chat: ChatId) -> Result<Vec<Message>, Self::Error>;
}

struct Assembler<'a, S: SnapshotSource> {
    source: &'a S,
    snap: Snapshot,
}

impl<'a, S: SnapshotSource> Assembler<'a, S> {
    fn observe(&mut self, scope: ScopeKey) -> Result<(), S::Error> {
        if !self.snap.revisions.contains_key(&scope) {
            let revision = self.source.revision(scope)?;
            self.snap.record(scope, revision);
        }
        Ok(())
    }

    fn user(&mut self, id: UserId) -> Result<(), S::Error> {
        self.observe(ScopeKey::User(id))?;
        if let Some(user) = self.source.user(id)? {
            self.snap.users.insert(id, user);
        }
        Ok(())
    }

    fn pair(&mut self, pair: UserPair) -> Result<(), S::Error> {
        if self.snap.revisions.contains_key(&ScopeKey::Pair(pair)) {
            return Ok(());
        }
        self.observe(ScopeKey::Pair(pair))?;
        self.user(pair.low())?;
        self.user(pair.high())?;

        if let Some(f) = self.source.friendship(pair)? {
            self.snap.friendships.insert(pair, f);
        }
        for r in self.source.requests_between(pair)? {
            self.snap.requests.insert(r.id, r);
        }
        for (a, b) in [(pair.low(), pair.high()), (pair.high(), pair.low())] {
            if let Some(block) = self.source.block(a, b)? {
                self.snap.blocks.insert((a, b), block);
            }
        }
        if let Some(chat) = self.source.direct_chat(pair)? {
            self.observe(ScopeKey::Chat(chat.id))?;
            self.snap.chats.insert(chat.id, chat);
        }
        Ok(())
    }

    fn chat(&mut self, id: ChatId) -> Result<(), S::Error> {
        self.observe(ScopeKey::Chat(id))?;
        let Some(chat) = self.source.chat(id)? else {
            return Ok(());
        };
        for invite in self.source.invites_for_chat(id)? {
            self.snap.invites.insert(invite.id, invite);
        }
        if let Some(pinned) = chat.pinned {
            self.observe(ScopeKey::Message(pinned))?;
            if let Some(message) = self.source.message(pinned)? {
                self.snap.messages.insert(pinned, message);
            }
        }
        let pair = chat.direct_pair();
        self.snap.chats.insert(id, chat);
        if let Some(pair) = pair {
            self.pair(pair)?;
        }
        Ok(())
    }

    fn lookup(&mut self, lookup: &Lookup) -> Result<(), S::Error> {
        match lookup {
            Lookup::User(id) => self.user(*id)?,
            Lookup::Pair(pair) => self.pair(*pair)?,
            Lookup::FriendRequest(id) => {
                if let Some(request) = self.source.friend_request(*id)? {
                    self.pair(request.pair())?;
                    self.snap.requests.insert(request.id, request);
                }
            }
            Lookup::Chat(id) => self.chat(*id)?,
            Lookup::Invite(id) => {
                if let Some(invite) = self.source.invite(*id)? {
                    self.chat(invite.chat)?;
                    self.pair(UserPair::new(invite.inviter, invite.invitee))?;
                    self.snap.invites.insert(invite.id, invite);
                }
            }
            Lookup::Message(id) => {
                if let Some(message) = self.source.message(*id)? {
                    self.observe(ScopeKey::Message(*id))?;
                    let chat = message.chat;
                    self.snap.messages.insert(*id, message);
                    self.chat(chat)?;
                }
            }
            Lookup::UserGraph(user) => {
                let edges = self.source.edges_of(*user)?;
                let mut others = BTreeSet::new();
                for f in edges.friendships {
                    others.extend(f.pair.other(*user));
                    self.snap.friendships.insert(f.pair, f);
                }
                for r in edges.requests {
                    others.extend(r.pair().other(*user));
                    self.snap.requests.insert(r.id, r);
                }
                for b in edges.blocks {
                    others.extend(b.pair().other(*user));
                    self.snap.blocks.insert((b.blocker, b.blocked), b);
                }
                others.insert(*user);
                for id in others {
                    if let Some(u) = self.source.user(id)? {
                        self.snap.users.insert(id, u);
                    }
                }
            }
            Lookup::UserChats(user) => {
                for chat in self.source.active_chats_of(*user)? {
                    for invite in self.source.invites_for_chat(chat.id)? {
                        self.snap.invites.insert(invite.id, invite);
                    }
                    self.snap.chats.insert(chat.id, chat);
                }
            }
            Lookup::ChatMessages(id) => {
                if let Some(chat) = self.source.chat(*id)? {
                    self.snap.chats.insert(*id, chat);
                }
                for m in self.source.chat_messages(*id)? {
                    self.snap.messages.insert(m.id, m);
                }
            }
        }
        Ok(())
    }
}

/// Build a snapshot covering `lookups` from `source`.
pub fn assemble<S: SnapshotSource>(source: &S, lookups: &[Lookup]) -> Result<Snapshot, S::Error> {
    let mut assembler = Assembler {
        source,
        snap: Snapshot::default(),
    };
    for lookup in lookups {
        assembler.lookup(lookup)?;
    }
    Ok(assembler.snap)
}
