use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ChatId, UserId};

/// Coarse classification of a denial, stable across reason codes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DenialKind {
    /// The actor lacks the rights for the operation.
    Unauthorized,
    /// The operation does not fit the current state of the entity.
    InvalidState,
    /// A referenced entity does not exist (any more).
    NotFound,
    /// A racing mutation kept invalidating the read snapshot.
    Conflict,
}

/// Reason an operation was refused.  Denials are ordinary results, not
/// failures; see [`Denial::kind`] for the coarse taxonomy.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Denial {
    // -- Unauthorized --
    #[error("Principal does not resolve to a user")]
    UnknownPrincipal,

    #[error("Only the receiver may answer a friend request")]
    NotRequestReceiver,

    #[error("Only the sender may revoke a friend request")]
    NotRequestSender,

    #[error("Only the blocker may lift a block")]
    NotBlocker,

    #[error("Actor is not a member of the chat")]
    NotMember,

    #[error("Only the invitee may answer an invite")]
    NotInvitee,

    #[error("Only the inviter or a moderator may revoke an invite")]
    NotInviter,

    #[error("Only the owner may do this")]
    NotOwner,

    #[error("Only the owner or a moderator may do this")]
    NotModerator,

    #[error("Actor does not outrank the target")]
    InsufficientRank,

    #[error("Only the sender may edit a message")]
    NotSender,

    // -- InvalidState --
    #[error("Actor and target are the same user")]
    SelfTarget,

    #[error("A block exists between the two users")]
    Blocked,

    #[error("Users are already friends")]
    AlreadyFriends,

    #[error("A friend request is already pending between the two users")]
    RequestPending,

    #[error("A direct chat already exists: {0}")]
    DirectChatExists(ChatId),

    #[error("Direct chat membership cannot change")]
    DirectChatImmutable,

    #[error("Chat is dissolved")]
    ChatDissolved,

    #[error("User is already a member of the chat")]
    AlreadyMember,

    #[error("An invite is already pending for this user")]
    InvitePending,

    #[error("The owner cannot be the target of this operation")]
    TargetIsOwner,

    #[error("Use leave to remove yourself from a chat")]
    CannotRemoveSelf,

    #[error("User is already a moderator")]
    AlreadyModerator,

    #[error("User is not a moderator")]
    NotAModerator,

    #[error("Content is empty")]
    EmptyContent,

    #[error("Content too long: {len} chars (max {max})")]
    ContentTooLong { len: usize, max: usize },

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid avatar: {0}")]
    InvalidAvatar(String),

    #[error("Message is deleted")]
    MessageDeleted,

    #[error("Message is already pinned")]
    AlreadyPinned,

    // -- NotFound --
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Friend request not found or no longer pending")]
    RequestNotFound,

    #[error("Users are not friends")]
    FriendshipNotFound,

    #[error("Block not found")]
    BlockNotFound,

    #[error("Chat not found")]
    ChatNotFound,

    #[error("Invite not found or no longer pending")]
    InviteNotFound,

    #[error("Message not found")]
    MessageNotFound,

    #[error("Target is not a member of the chat")]
    MemberNotFound,

    // -- Conflict --
    #[error("Concurrent modification, gave up after {0} attempts")]
    Conflict(u32),
}

impl Denial {
    pub fn kind(&self) -> DenialKind {
        use Denial::*;
        match self {
            UnknownPrincipal | NotRequestReceiver | NotRequestSender | NotBlocker | NotMember
            | NotInvitee | NotInviter | NotOwner | NotModerator | InsufficientRank | NotSender => {
                DenialKind::Unauthorized
            }

            SelfTarget
            | Blocked
            | AlreadyFriends
            | RequestPending
            | DirectChatExists(_)
            | DirectChatImmutable
            | ChatDissolved
            | AlreadyMember
            | InvitePending
            | TargetIsOwner
            | CannotRemoveSelf
            | AlreadyModerator
            | NotAModerator
            | EmptyContent
            | ContentTooLong { .. }
            | InvalidName(_)
            | InvalidAvatar(_)
            | MessageDeleted
            | AlreadyPinned => DenialKind::InvalidState,

            UserNotFound(_) | RequestNotFound | FriendshipNotFound | BlockNotFound
            | ChatNotFound | InviteNotFound | MessageNotFound | MemberNotFound => {
                DenialKind::NotFound
            }

            Conflict(_) => DenialKind::Conflict,
        }
    }
}
