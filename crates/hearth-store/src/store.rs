//! [`Store`] implementation over the SQLite [`Database`].
//!
//! A single connection sits behind a mutex.  Commits run in one
//! transaction: expected revisions are checked first and every touched
//! scope is bumped before the transaction commits.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use hearth_core::loader::{self, Edges, SnapshotSource};
use hearth_core::store::{
    AtomicWrite, CommitOutcome, IdentityResolver, Lookup, PersistenceError, ScopeKey, Snapshot,
    Store, WriteOp,
};
use hearth_shared::{
    Block, Chat, ChatId, FriendRequest, FriendRequestId, Friendship, GroupInvite, InviteId,
    Message, MessageId, User, UserId, UserPair,
};

use crate::database::Database;
use crate::error::{Result, StoreError};

impl SnapshotSource for Database {
    type Error = StoreError;

    fn revision(&self, scope: ScopeKey) -> Result<u64> {
        Database::revision(self, scope)
    }

    fn user(&self, id: UserId) -> Result<Option<User>> {
        self.get_user(id)
    }

    fn friendship(&self, pair: UserPair) -> Result<Option<Friendship>> {
        self.get_friendship(pair)
    }

    fn friend_request(&self, id: FriendRequestId) -> Result<Option<FriendRequest>> {
        self.get_friend_request(id)
    }

    fn requests_between(&self, pair: UserPair) -> Result<Vec<FriendRequest>> {
        Database::requests_between(self, pair)
    }

    fn block(&self, blocker: UserId, blocked: UserId) -> Result<Option<Block>> {
        self.get_block(blocker, blocked)
    }

    fn direct_chat(&self, pair: UserPair) -> Result<Option<Chat>> {
        self.direct_chat_for(pair)
    }

    fn chat(&self, id: ChatId) -> Result<Option<Chat>> {
        self.get_chat(id)
    }

    fn invite(&self, id: InviteId) -> Result<Option<GroupInvite>> {
        self.get_invite(id)
    }

    fn invites_for_chat(&self, chat: ChatId) -> Result<Vec<GroupInvite>> {
        Database::invites_for_chat(self, chat)
    }

    fn message(&self, id: MessageId) -> Result<Option<Message>> {
        self.get_message(id)
    }

    fn edges_of(&self, user: UserId) -> Result<Edges> {
        Ok(Edges {
            friendships: self.friendships_of(user)?,
            requests: self.requests_of(user)?,
            blocks: self.blocks_of(user)?,
        })
    }

    fn active_chats_of(&self, user: UserId) -> Result<Vec<Chat>> {
        Database::active_chats_of(self, user)
    }

    fn chat_messages(&self, chat: ChatId) -> Result<Vec<Message>> {
        self.messages_for_chat(chat)
    }
}

impl Database {
    fn apply(&self, op: &WriteOp) -> Result<()> {
        match op {
            WriteOp::PutUser(user) => self.update_user(user),
            WriteOp::PutFriendship(f) => self.put_friendship(f),
            WriteOp::DeleteFriendship(pair) => self.delete_friendship(*pair).map(drop),
            WriteOp::PutFriendRequest(r) => self.put_friend_request(r),
            WriteOp::DeleteFriendRequest { id, .. } => self.delete_friend_request(*id).map(drop),
            WriteOp::PutBlock(b) => self.put_block(b),
            WriteOp::DeleteBlock { blocker, blocked } => {
                self.delete_block(*blocker, *blocked).map(drop)
            }
            WriteOp::PutChat(chat) => self.put_chat(chat),
            WriteOp::PutInvite(i) => self.put_invite(i),
            WriteOp::DeleteInvite { id, .. } => self.delete_invite(*id).map(drop),
            WriteOp::PutMessage(m) => self.put_message(m),
        }
    }

    /// Check `write.expected` and apply it inside one transaction.
    fn commit_write(&self, write: &AtomicWrite) -> Result<CommitOutcome> {
        let tx = self.conn().unchecked_transaction()?;

        for (scope, expected) in &write.expected {
            if self.revision(*scope)? != *expected {
                debug!(scope = %scope.key(), "stale revision");
                return Ok(CommitOutcome::Conflict);
            }
        }

        let mut touched = BTreeSet::new();
        for op in &write.ops {
            self.apply(op)?;
            touched.extend(op.scopes());
        }
        for scope in touched {
            self.bump_revision(scope)?;
        }

        tx.commit()?;
        Ok(CommitOutcome::Committed)
    }
}

/// Thread-safe handle implementing the engine's persistence seam.
pub struct SqliteStore {
    db: Mutex<Database>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Open the default application database.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Database::new()?))
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open_at(path)?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Register a user.  Account creation happens outside the engine.
    pub fn insert_user(&self, user: &User) -> Result<()> {
        let db = self.lock()?;
        db.create_user(user)?;
        db.bump_revision(ScopeKey::User(user.id))
    }
}

impl Store for SqliteStore {
    fn snapshot(&self, lookups: &[Lookup]) -> std::result::Result<Snapshot, PersistenceError> {
        let db = self.lock()?;
        Ok(loader::assemble(&*db, lookups)?)
    }

    fn commit(&self, write: &AtomicWrite) -> std::result::Result<CommitOutcome, PersistenceError> {
        let db = self.lock()?;
        Ok(db.commit_write(write)?)
    }
}

impl IdentityResolver for SqliteStore {
    fn resolve(&self, principal: &str) -> std::result::Result<Option<User>, PersistenceError> {
        let db = self.lock()?;
        Ok(db.find_user_by_username(principal)?)
    }
}
