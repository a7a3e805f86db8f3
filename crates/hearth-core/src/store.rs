//! The persistence seam.
//!
//! The engine never mutates shared state in place.  It asks a [`Store`] for
//! a [`Snapshot`] of the entities an operation depends on, decides, and
//! hands back a single [`AtomicWrite`].  Each snapshot carries the revision
//! of every scope it read; the store refuses the write if any of those
//! revisions moved in the meantime, which is how racing commands are
//! detected.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use hearth_shared::{
    Block, Chat, ChatId, Denial, FriendRequest, FriendRequestId, Friendship, GroupInvite,
    InviteId, Message, MessageId, User, UserId, UserPair,
};

/// Unit of optimistic concurrency.  Every write bumps the revision of each
/// scope it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeKey {
    User(UserId),
    /// Friendship, requests, blocks and the direct chat of a pair.
    Pair(UserPair),
    /// Chat record, membership, roles, pin and pending invites.
    Chat(ChatId),
    Message(MessageId),
}

impl ScopeKey {
    /// Stable textual form, used as a key by persistent stores.
    pub fn key(&self) -> String {
        match self {
            ScopeKey::User(id) => format!("user:{id}"),
            ScopeKey::Pair(pair) => format!("pair:{}:{}", pair.low(), pair.high()),
            ScopeKey::Chat(id) => format!("chat:{id}"),
            ScopeKey::Message(id) => format!("message:{id}"),
        }
    }
}

/// What to load into a snapshot.  Lookups by id expand to everything the
/// decisions over that entity need, so one snapshot call is enough per
/// attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// A single user.
    User(UserId),
    /// Both users, their friendship, requests and blocks in either
    /// direction, and their direct chat.
    Pair(UserPair),
    /// A friend request by id, expanded with its [`Lookup::Pair`].
    FriendRequest(FriendRequestId),
    /// A chat, its pending invites and its pinned message.  A direct chat
    /// is expanded with the [`Lookup::Pair`] of its participants.
    Chat(ChatId),
    /// An invite by id, expanded with its [`Lookup::Chat`] and the
    /// inviter/invitee [`Lookup::Pair`].
    Invite(InviteId),
    /// A message by id, expanded with its [`Lookup::Chat`].
    Message(MessageId),
    /// Every edge touching a user plus the users on the other end.
    /// Read-only: records no revisions.
    UserGraph(UserId),
    /// Every active chat the user belongs to with its pending invites.
    /// Read-only: records no revisions.
    UserChats(UserId),
    /// Every message of a chat.  Read-only: records no revisions.
    ChatMessages(ChatId),
}

/// A single mutation inside an [`AtomicWrite`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    PutUser(User),
    PutFriendship(Friendship),
    DeleteFriendship(UserPair),
    PutFriendRequest(FriendRequest),
    DeleteFriendRequest { id: FriendRequestId, pair: UserPair },
    PutBlock(Block),
    DeleteBlock { blocker: UserId, blocked: UserId },
    /// Insert or replace a chat including its membership.
    PutChat(Chat),
    PutInvite(GroupInvite),
    DeleteInvite { id: InviteId, chat: ChatId },
    PutMessage(Message),
}

impl WriteOp {
    /// Scopes whose revision this operation bumps.
    pub fn scopes(&self) -> Vec<ScopeKey> {
        match self {
            WriteOp::PutUser(user) => vec![ScopeKey::User(user.id)],
            WriteOp::PutFriendship(f) => vec![ScopeKey::Pair(f.pair)],
            WriteOp::DeleteFriendship(pair) => vec![ScopeKey::Pair(*pair)],
            WriteOp::PutFriendRequest(r) => vec![ScopeKey::Pair(r.pair())],
            WriteOp::DeleteFriendRequest { pair, .. } => vec![ScopeKey::Pair(*pair)],
            WriteOp::PutBlock(b) => vec![ScopeKey::Pair(b.pair())],
            WriteOp::DeleteBlock { blocker, blocked } => {
                vec![ScopeKey::Pair(UserPair::new(*blocker, *blocked))]
            }
            WriteOp::PutChat(chat) => {
                let mut scopes = vec![ScopeKey::Chat(chat.id)];
                if let Some(pair) = chat.direct_pair() {
                    scopes.push(ScopeKey::Pair(pair));
                }
                scopes
            }
            WriteOp::PutInvite(i) => vec![ScopeKey::Chat(i.chat)],
            WriteOp::DeleteInvite { chat, .. } => vec![ScopeKey::Chat(*chat)],
            WriteOp::PutMessage(m) => vec![ScopeKey::Message(m.id)],
        }
    }
}

/// Revisions observed by a snapshot, keyed by scope.
pub type Revisions = BTreeMap<ScopeKey, u64>;

/// All-or-nothing write guarded by the revisions it was decided on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomicWrite {
    pub expected: Revisions,
    pub ops: Vec<WriteOp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// At least one expected revision moved.  Nothing was written.
    Conflict,
}

/// Unexpected failure of the persistence collaborator.  Unlike a
/// [`Denial`], this is fatal for the command that hit it.
#[derive(Error, Debug)]
#[error("Persistence error: {0}")]
pub struct PersistenceError(#[source] pub Box<dyn std::error::Error + Send + Sync + 'static>);

impl PersistenceError {
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Box::new(err))
    }
}

/// Persistence collaborator contract.
pub trait Store: Send + Sync {
    /// Load a consistent view covering every lookup.
    fn snapshot(&self, lookups: &[Lookup]) -> Result<Snapshot, PersistenceError>;

    /// Apply `write` atomically, or report a conflict without writing.
    fn commit(&self, write: &AtomicWrite) -> Result<CommitOutcome, PersistenceError>;
}

/// Maps an authenticated principal (login name) to its user record.
pub trait IdentityResolver {
    fn resolve(&self, principal: &str) -> Result<Option<User>, PersistenceError>;
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// In-memory view of the entities an operation reads.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub users: HashMap<UserId, User>,
    pub friendships: HashMap<UserPair, Friendship>,
    pub requests: HashMap<FriendRequestId, FriendRequest>,
    /// Keyed by `(blocker, blocked)`.
    pub blocks: HashMap<(UserId, UserId), Block>,
    pub chats: HashMap<ChatId, Chat>,
    pub invites: HashMap<InviteId, GroupInvite>,
    pub messages: HashMap<MessageId, Message>,
    pub revisions: Revisions,
}

impl Snapshot {
    pub fn record(&mut self, scope: ScopeKey, revision: u64) {
        self.revisions.insert(scope, revision);
    }

    pub fn user(&self, id: UserId) -> Result<&User, Denial> {
        self.users.get(&id).ok_or(Denial::UserNotFound(id))
    }

    pub fn friendship(&self, pair: UserPair) -> Option<&Friendship> {
        self.friendships.get(&pair)
    }

    pub fn request(&self, id: FriendRequestId) -> Result<&FriendRequest, Denial> {
        self.requests.get(&id).ok_or(Denial::RequestNotFound)
    }

    /// Outstanding requests between the pair, in either direction.
    pub fn requests_between(&self, pair: UserPair) -> impl Iterator<Item = &FriendRequest> {
        self.requests.values().filter(move |r| r.pair() == pair)
    }

    pub fn request_from(&self, sender: UserId, receiver: UserId) -> Option<&FriendRequest> {
        self.requests
            .values()
            .find(|r| r.sender == sender && r.receiver == receiver)
    }

    pub fn block(&self, blocker: UserId, blocked: UserId) -> Option<&Block> {
        self.blocks.get(&(blocker, blocked))
    }

    /// True when a block exists in either direction.
    pub fn blocked_either(&self, a: UserId, b: UserId) -> bool {
        self.block(a, b).is_some() || self.block(b, a).is_some()
    }

    pub fn direct_chat(&self, pair: UserPair) -> Option<&Chat> {
        self.chats
            .values()
            .find(|c| c.direct_pair() == Some(pair))
    }

    pub fn chat(&self, id: ChatId) -> Result<&Chat, Denial> {
        self.chats.get(&id).ok_or(Denial::ChatNotFound)
    }

    pub fn invite(&self, id: InviteId) -> Result<&GroupInvite, Denial> {
        self.invites.get(&id).ok_or(Denial::InviteNotFound)
    }

    pub fn invites_for_chat(&self, chat: ChatId) -> impl Iterator<Item = &GroupInvite> {
        self.invites.values().filter(move |i| i.chat == chat)
    }

    pub fn message(&self, id: MessageId) -> Result<&Message, Denial> {
        self.messages.get(&id).ok_or(Denial::MessageNotFound)
    }

    /// Messages of a chat in send order.
    pub fn chat_messages(&self, chat: ChatId) -> Vec<&Message> {
        let mut messages: Vec<_> = self.messages.values().filter(|m| m.chat == chat).collect();
        messages.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then(a.id.cmp(&b.id)));
        messages
    }
}
