//! In-process [`Store`] backed by hash maps behind one mutex.  Used by the
//! tests and by embedders that keep their state elsewhere.

use std::collections::{BTreeSet, HashMap};
use std::convert::Infallible;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tracing::debug;

use hearth_shared::{
    Block, Chat, ChatId, FriendRequest, FriendRequestId, Friendship, GroupInvite, InviteId,
    Message, MessageId, User, UserId, UserPair,
};

use crate::loader::{self, Edges, SnapshotSource};
use crate::store::{
    AtomicWrite, CommitOutcome, IdentityResolver, Lookup, PersistenceError, ScopeKey, Snapshot,
    Store, WriteOp,
};

#[derive(Error, Debug)]
#[error("memory store lock poisoned")]
struct Poisoned;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    friendships: HashMap<UserPair, Friendship>,
    requests: HashMap<FriendRequestId, FriendRequest>,
    blocks: HashMap<(UserId, UserId), Block>,
    chats: HashMap<ChatId, Chat>,
    invites: HashMap<InviteId, GroupInvite>,
    messages: HashMap<MessageId, Message>,
    revisions: HashMap<ScopeKey, u64>,
}

impl Tables {
    fn revision_of(&self, scope: ScopeKey) -> u64 {
        self.revisions.get(&scope).copied().unwrap_or(0)
    }

    fn apply(&mut self, op: &WriteOp) {
        match op {
            WriteOp::PutUser(user) => {
                self.users.insert(user.id, user.clone());
            }
            WriteOp::PutFriendship(f) => {
                self.friendships.insert(f.pair, f.clone());
            }
            WriteOp::DeleteFriendship(pair) => {
                self.friendships.remove(pair);
            }
            WriteOp::PutFriendRequest(r) => {
                self.requests.insert(r.id, r.clone());
            }
            WriteOp::DeleteFriendRequest { id, .. } => {
                self.requests.remove(id);
            }
            WriteOp::PutBlock(b) => {
                self.blocks.insert((b.blocker, b.blocked), b.clone());
            }
            WriteOp::DeleteBlock { blocker, blocked } => {
                self.blocks.remove(&(*blocker, *blocked));
            }
            WriteOp::PutChat(chat) => {
                self.chats.insert(chat.id, chat.clone());
            }
            WriteOp::PutInvite(i) => {
                self.invites.insert(i.id, i.clone());
            }
            WriteOp::DeleteInvite { id, .. } => {
                self.invites.remove(id);
            }
            WriteOp::PutMessage(m) => {
                self.messages.insert(m.id, m.clone());
            }
        }
    }
}

impl SnapshotSource for Tables {
    type Error = Infallible;

    fn revision(&self, scope: ScopeKey) -> Result<u64, Infallible> {
        Ok(self.revision_of(scope))
    }

    fn user(&self, id: UserId) -> Result<Option<User>, Infallible> {
        Ok(self.users.get(&id).cloned())
    }

    fn friendship(&self, pair: UserPair) -> Result<Option<Friendship>, Infallible> {
        Ok(self.friendships.get(&pair).cloned())
    }

    fn friend_request(&self, id: FriendRequestId) -> Result<Option<FriendRequest>, Infallible> {
        Ok(self.requests.get(&id).cloned())
    }

    fn requests_between(&self, pair: UserPair) -> Result<Vec<FriendRequest>, Infallible> {
        Ok(self
            .requests
            .values()
            .filter(|r| r.pair() == pair)
            .cloned()
            .collect())
    }

    fn block(&self, blocker: UserId, blocked: UserId) -> Result<Option<Block>, Infallible> {
        Ok(self.blocks.get(&(blocker, blocked)).cloned())
    }

    fn direct_chat(&self, pair: UserPair) -> Result<Option<Chat>, Infallible> {
        Ok(self
            .chats
            .values()
            .find(|c| c.direct_pair() == Some(pair))
            .cloned())
    }

    fn chat(&self, id: ChatId) -> Result<Option<Chat>, Infallible> {
        Ok(self.chats.get(&id).cloned())
    }

    fn invite(&self, id: InviteId) -> Result<Option<GroupInvite>, Infallible> {
        Ok(self.invites.get(&id).cloned())
    }

    fn invites_for_chat(&self, chat: ChatId) -> Result<Vec<GroupInvite>, Infallible> {
        Ok(self
            .invites
            .values()
            .filter(|i| i.chat == chat)
            .cloned()
            .collect())
    }

    fn message(&self, id: MessageId) -> Result<Option<Message>, Infallible> {
        Ok(self.messages.get(&id).cloned())
    }

    fn edges_of(&self, user: UserId) -> Result<Edges, Infallible> {
        Ok(Edges {
            friendships: self
                .friendships
                .values()
                .filter(|f| f.pair.contains(user))
                .cloned()
                .collect(),
            requests: self
                .requests
                .values()
                .filter(|r| r.pair().contains(user))
                .cloned()
                .collect(),
            blocks: self
                .blocks
                .values()
                .filter(|b| b.pair().contains(user))
                .cloned()
                .collect(),
        })
    }

    fn active_chats_of(&self, user: UserId) -> Result<Vec<Chat>, Infallible> {
        Ok(self
            .chats
            .values()
            .filter(|c| c.is_active() && c.is_member(user))
            .cloned()
            .collect())
    }

    fn chat_messages(&self, chat: ChatId) -> Result<Vec<Message>, Infallible> {
        Ok(self
            .messages
            .values()
            .filter(|m| m.chat == chat)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, PersistenceError> {
        self.tables.lock().map_err(|_| PersistenceError::new(Poisoned))
    }

    /// Register a user.  Account creation is owned by whoever embeds the
    /// engine, so this bypasses the decision layer.
    pub fn insert_user(&self, user: User) -> Result<(), PersistenceError> {
        let mut tables = self.lock()?;
        *tables.revisions.entry(ScopeKey::User(user.id)).or_insert(0) += 1;
        tables.users.insert(user.id, user);
        Ok(())
    }
}

impl Store for MemoryStore {
    fn snapshot(&self, lookups: &[Lookup]) -> Result<Snapshot, PersistenceError> {
        let tables = self.lock()?;
        match loader::assemble(&*tables, lookups) {
            Ok(snap) => Ok(snap),
            Err(never) => match never {},
        }
    }

    fn commit(&self, write: &AtomicWrite) -> Result<CommitOutcome, PersistenceError> {
        let mut tables = self.lock()?;
        if let Some((scope, _)) = write
            .expected
            .iter()
            .find(|(scope, rev)| tables.revision_of(**scope) != **rev)
        {
            debug!(scope = %scope.key(), "stale revision");
            return Ok(CommitOutcome::Conflict);
        }

        let mut touched = BTreeSet::new();
        for op in &write.ops {
            tables.apply(op);
            touched.extend(op.scopes());
        }
        for scope in touched {
            *tables.revisions.entry(scope).or_insert(0) += 1;
        }
        Ok(CommitOutcome::Committed)
    }
}

impl IdentityResolver for MemoryStore {
    fn resolve(&self, principal: &str) -> Result<Option<User>, PersistenceError> {
        let tables = self.lock()?;
        Ok(tables
            .users
            .values()
            .find(|u| u.username == principal)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn two_users(store: &MemoryStore) -> (UserId, UserId) {
        let a = User::new("alice");
        let b = User::new("bob");
        let ids = (a.id, b.id);
        store.insert_user(a).unwrap();
        store.insert_user(b).unwrap();
        ids
    }

    #[test]
    fn stale_write_is_rejected() {
        let store = MemoryStore::new();
        let (a, b) = two_users(&store);
        let pair = UserPair::new(a, b);

        let first = store.snapshot(&[Lookup::Pair(pair)]).unwrap();
        let second = store.snapshot(&[Lookup::Pair(pair)]).unwrap();

        let friendship = Friendship {
            pair,
            since: Utc::now(),
        };
        let write = |snap: &Snapshot| AtomicWrite {
            expected: snap.revisions.clone(),
            ops: vec![WriteOp::PutFriendship(friendship.clone())],
        };

        assert_eq!(store.commit(&write(&first)).unwrap(), CommitOutcome::Committed);
        assert_eq!(store.commit(&write(&second)).unwrap(), CommitOutcome::Conflict);
    }

    #[test]
    fn pair_lookup_includes_direct_chat() {
        let store = MemoryStore::new();
        let (a, b) = two_users(&store);
        let chat = crate::chat::new_direct_chat(a, b, Utc::now());
        store
            .commit(&AtomicWrite {
                expected: Default::default(),
                ops: vec![WriteOp::PutChat(chat.clone())],
            })
            .unwrap();

        let snap = store.snapshot(&[Lookup::Pair(UserPair::new(b, a))]).unwrap();
        assert_eq!(snap.direct_chat(UserPair::new(a, b)).map(|c| c.id), Some(chat.id));
        assert_eq!(snap.revisions.get(&ScopeKey::Chat(chat.id)), Some(&1));
        assert_eq!(snap.users.len(), 2);
    }

    #[test]
    fn message_lookup_pulls_in_its_chat() {
        let store = MemoryStore::new();
        let (a, b) = two_users(&store);
        let chat = crate::chat::new_direct_chat(a, b, Utc::now());
        let message = Message {
            id: MessageId::new(),
            chat: chat.id,
            sender: a,
            content: "hi".into(),
            sent_at: Utc::now(),
            edited_at: None,
            pinned: false,
            deleted_at: None,
        };
        store
            .commit(&AtomicWrite {
                expected: Default::default(),
                ops: vec![
                    WriteOp::PutChat(chat.clone()),
                    WriteOp::PutMessage(message.clone()),
                ],
            })
            .unwrap();

        let snap = store.snapshot(&[Lookup::Message(message.id)]).unwrap();
        assert!(snap.chat(chat.id).is_ok());
        assert!(snap.revisions.contains_key(&ScopeKey::Pair(UserPair::new(a, b))));
    }

    #[test]
    fn resolves_by_username() {
        let store = MemoryStore::new();
        let (a, _) = two_users(&store);
        assert_eq!(store.resolve("alice").unwrap().map(|u| u.id), Some(a));
        assert!(store.resolve("mallory").unwrap().is_none());
    }
}
