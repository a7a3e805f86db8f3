//! Domain records shared by the policy engines and the persistence layer.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to a presentation layer or written to disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::avatar;
use crate::types::{ChatId, FriendRequestId, InviteId, MessageId, UserId, UserPair};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user.  Registration happens outside this workspace; the
/// engine only ever edits the profile fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    /// Login name the identity resolver matches against.
    pub username: String,
    /// Optional human-readable display name.
    pub display_name: Option<String>,
    /// Raw PNG or JPEG bytes.
    pub avatar: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            username: username.into(),
            display_name: None,
            avatar: None,
            created_at: Utc::now(),
        }
    }

    /// Display name, falling back to the username.
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }

    /// `data:` URL suitable for an `<img>` element, or `None` without avatar.
    pub fn avatar_data_url(&self) -> Option<String> {
        self.avatar.as_deref().map(avatar::data_url)
    }
}

// ---------------------------------------------------------------------------
// Social graph edges
// ---------------------------------------------------------------------------

/// Accepted, symmetric relationship between two users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Friendship {
    pub pair: UserPair,
    pub since: DateTime<Utc>,
}

/// Directed, outstanding friend request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendRequest {
    pub id: FriendRequestId,
    pub sender: UserId,
    pub receiver: UserId,
    pub created_at: DateTime<Utc>,
}

impl FriendRequest {
    pub fn pair(&self) -> UserPair {
        UserPair::new(self.sender, self.receiver)
    }
}

/// Directed block edge.  A block in either direction suppresses messaging,
/// friend requests and invites between the two users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub blocker: UserId,
    pub blocked: UserId,
    pub created_at: DateTime<Utc>,
}

impl Block {
    pub fn pair(&self) -> UserPair {
        UserPair::new(self.blocker, self.blocked)
    }
}

/// How one user relates to another, seen from the first user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Relationship {
    /// Both sides are the same user.
    Myself,
    Friend,
    /// The viewer blocked the other user.
    Blocked,
    /// The other user blocked the viewer.
    BlockedBy,
    PendingOutgoing,
    PendingIncoming,
    None,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Role of a member inside a chat.  Variants are declared in rank order so
/// the derived `Ord` gives `Member < Moderator < Owner`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Member,
    Moderator,
    Owner,
}

impl Role {
    /// Owners and moderators may moderate content.
    pub fn can_moderate(self) -> bool {
        self >= Role::Moderator
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Moderator => "moderator",
            Role::Owner => "owner",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "member" => Some(Role::Member),
            "moderator" => Some(Role::Moderator),
            "owner" => Some(Role::Owner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChatState {
    Active,
    /// No members left.  History is retained, every mutation is rejected.
    Dissolved,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChatKind {
    /// Two-party chat with fixed membership and no roles.
    Direct,
    Group {
        name: String,
        /// Set at creation; only changes hands when the owner leaves.
        owner: UserId,
        avatar: Option<Vec<u8>>,
    },
}

/// One member of a chat.  Members are kept in join order, so the position
/// in [`Chat::members`] is the member's tenure rank.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Membership {
    pub user: UserId,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    pub kind: ChatKind,
    pub state: ChatState,
    pub members: Vec<Membership>,
    /// The single pinned message, if any.
    pub pinned: Option<MessageId>,
    /// Timestamp of the newest message, used to keep `sent_at` monotonic.
    pub last_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn is_direct(&self) -> bool {
        matches!(self.kind, ChatKind::Direct)
    }

    pub fn is_active(&self) -> bool {
        self.state == ChatState::Active
    }

    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            ChatKind::Group { name, .. } => Some(name),
            ChatKind::Direct => None,
        }
    }

    pub fn owner(&self) -> Option<UserId> {
        match &self.kind {
            ChatKind::Group { owner, .. } => Some(*owner),
            ChatKind::Direct => None,
        }
    }

    pub fn membership(&self, user: UserId) -> Option<&Membership> {
        self.members.iter().find(|m| m.user == user)
    }

    pub fn is_member(&self, user: UserId) -> bool {
        self.membership(user).is_some()
    }

    pub fn role_of(&self, user: UserId) -> Option<Role> {
        self.membership(user).map(|m| m.role)
    }

    pub fn moderators(&self) -> impl Iterator<Item = UserId> + '_ {
        self.members
            .iter()
            .filter(|m| m.role == Role::Moderator)
            .map(|m| m.user)
    }

    /// For a direct chat, the participant pair.
    pub fn direct_pair(&self) -> Option<UserPair> {
        match (&self.kind, self.members.as_slice()) {
            (ChatKind::Direct, [a, b]) => Some(UserPair::new(a.user, b.user)),
            _ => None,
        }
    }

    /// Checks the structural role invariants: exactly one owner, who is the
    /// recorded owner; direct chats carry no roles and exactly two members.
    pub fn roles_consistent(&self) -> bool {
        match &self.kind {
            ChatKind::Direct => {
                self.members.len() == 2 && self.members.iter().all(|m| m.role == Role::Member)
            }
            ChatKind::Group { owner, .. } => {
                if self.state == ChatState::Dissolved {
                    return self.members.is_empty();
                }
                let owners: Vec<_> = self
                    .members
                    .iter()
                    .filter(|m| m.role == Role::Owner)
                    .collect();
                owners.len() == 1 && owners[0].user == *owner
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub chat: ChatId,
    pub sender: UserId,
    /// Empty once the message is deleted.
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub pinned: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

// ---------------------------------------------------------------------------
// Group invite
// ---------------------------------------------------------------------------

/// Pending invitation of a user into a group chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupInvite {
    pub id: InviteId,
    pub chat: ChatId,
    pub inviter: UserId,
    pub invitee: UserId,
    pub created_at: DateTime<Utc>,
}
