//! Chat membership and moderation.
//!
//! Direct chats have exactly two members and never change membership.
//! Group chats have one owner, any number of moderators and plain members,
//! ranked `Owner > Moderator > Member`.  A group whose last member leaves is
//! dissolved and rejects every further mutation.

use chrono::{DateTime, Utc};

use hearth_shared::avatar;
use hearth_shared::events::{ChangeKind, EntityId, EntityKind};
use hearth_shared::{
    Chat, ChatId, ChatKind, ChatState, Denial, GroupInvite, InviteId, Membership, Role, UserId,
    UserPair,
};

use crate::plan::{Ctx, Plan};
use crate::profile::AvatarUpdate;
use crate::store::{Snapshot, WriteOp};

/// Summary of a [`leave_chat`] decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveSummary {
    /// Set when the leaving owner handed the chat over.
    pub new_owner: Option<UserId>,
    pub dissolved: bool,
}

/// Changes to a group's presentation.  `None` / `Keep` leave a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupSettings {
    pub name: Option<String>,
    pub avatar: AvatarUpdate,
}

pub fn new_direct_chat(a: UserId, b: UserId, now: DateTime<Utc>) -> Chat {
    Chat {
        id: ChatId::new(),
        kind: ChatKind::Direct,
        state: ChatState::Active,
        members: [a, b]
            .into_iter()
            .map(|user| Membership {
                user,
                role: Role::Member,
                joined_at: now,
            })
            .collect(),
        pinned: None,
        last_sent_at: None,
        created_at: now,
    }
}

/// Trim and length-check a group name.
pub fn validate_name(name: &str, max: usize) -> Result<String, Denial> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Denial::InvalidName("name is empty".into()));
    }
    let len = name.chars().count();
    if len > max {
        return Err(Denial::InvalidName(format!("{len} chars (max {max})")));
    }
    Ok(name.to_string())
}

/// Fetch a group chat that still accepts mutations.
fn active_group(snap: &Snapshot, chat: ChatId) -> Result<&Chat, Denial> {
    let chat = snap.chat(chat)?;
    if chat.is_direct() {
        return Err(Denial::DirectChatImmutable);
    }
    if !chat.is_active() {
        return Err(Denial::ChatDissolved);
    }
    Ok(chat)
}

fn actor_role(chat: &Chat, actor: UserId) -> Result<Role, Denial> {
    chat.role_of(actor).ok_or(Denial::NotMember)
}

fn put_chat<T>(plan: &mut Plan<T>, chat: Chat, entity: EntityKind, change: ChangeKind) {
    let id = chat.id;
    plan.write(WriteOp::PutChat(chat))
        .event(entity, EntityId::Chat(id), change);
}

fn drop_invite<T>(plan: &mut Plan<T>, invite: &GroupInvite) {
    plan.write(WriteOp::DeleteInvite {
        id: invite.id,
        chat: invite.chat,
    })
    .event(
        EntityKind::Invite,
        EntityId::Invite(invite.id),
        ChangeKind::Deleted,
    );
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

pub fn create_direct_chat(
    snap: &Snapshot,
    ctx: Ctx<'_>,
    a: UserId,
    b: UserId,
) -> Result<Plan<Chat>, Denial> {
    if a == b {
        return Err(Denial::SelfTarget);
    }
    snap.user(a)?;
    snap.user(b)?;
    if snap.blocked_either(a, b) {
        return Err(Denial::Blocked);
    }
    if let Some(existing) = snap.direct_chat(UserPair::new(a, b)) {
        return Err(Denial::DirectChatExists(existing.id));
    }

    let chat = new_direct_chat(a, b, ctx.now);
    let mut plan = Plan::new(chat.clone());
    put_chat(&mut plan, chat, EntityKind::Chat, ChangeKind::Created);
    Ok(plan)
}

/// Create a group owned by `owner`.  The snapshot must cover the pair of
/// the owner with each initial member.
pub fn create_group_chat(
    snap: &Snapshot,
    ctx: Ctx<'_>,
    owner: UserId,
    name: &str,
    initial_members: &[UserId],
) -> Result<Plan<Chat>, Denial> {
    let name = validate_name(name, ctx.config.max_group_name_len)?;
    snap.user(owner)?;

    let mut members = vec![Membership {
        user: owner,
        role: Role::Owner,
        joined_at: ctx.now,
    }];
    for &user in initial_members {
        if members.iter().any(|m| m.user == user) {
            continue;
        }
        snap.user(user)?;
        if snap.blocked_either(owner, user) {
            return Err(Denial::Blocked);
        }
        members.push(Membership {
            user,
            role: Role::Member,
            joined_at: ctx.now,
        });
    }

    let chat = Chat {
        id: ChatId::new(),
        kind: ChatKind::Group {
            name,
            owner,
            avatar: None,
        },
        state: ChatState::Active,
        members,
        pinned: None,
        last_sent_at: None,
        created_at: ctx.now,
    };
    let mut plan = Plan::new(chat.clone());
    put_chat(&mut plan, chat, EntityKind::Chat, ChangeKind::Created);
    Ok(plan)
}

// ---------------------------------------------------------------------------
// Invites
// ---------------------------------------------------------------------------

/// Invite `invitee` into a group.  The snapshot must cover the chat and the
/// pair `{actor, invitee}`.
pub fn invite_member(
    snap: &Snapshot,
    ctx: Ctx<'_>,
    actor: UserId,
    chat_id: ChatId,
    invitee: UserId,
) -> Result<Plan<GroupInvite>, Denial> {
    let chat = active_group(snap, chat_id)?;
    actor_role(chat, actor)?;
    snap.user(invitee)?;
    if chat.is_member(invitee) {
        return Err(Denial::AlreadyMember);
    }
    if snap.blocked_either(actor, invitee) {
        return Err(Denial::Blocked);
    }
    if snap
        .invites_for_chat(chat_id)
        .any(|i| i.invitee == invitee)
    {
        return Err(Denial::InvitePending);
    }

    let invite = GroupInvite {
        id: InviteId::new(),
        chat: chat_id,
        inviter: actor,
        invitee,
        created_at: ctx.now,
    };
    let mut plan = Plan::new(invite.clone());
    plan.write(WriteOp::PutInvite(invite.clone())).event(
        EntityKind::Invite,
        EntityId::Invite(invite.id),
        ChangeKind::Created,
    );
    Ok(plan)
}

/// Accept or decline an invite.  Returns the updated chat on accept.  The
/// snapshot must cover the invite, its chat and the inviter/invitee pair.
pub fn respond_to_invite(
    snap: &Snapshot,
    ctx: Ctx<'_>,
    actor: UserId,
    invite_id: InviteId,
    accept: bool,
) -> Result<Plan<Option<Chat>>, Denial> {
    let invite = snap.invite(invite_id)?;
    if invite.invitee != actor {
        return Err(Denial::NotInvitee);
    }

    if !accept {
        let mut plan = Plan::new(None);
        drop_invite(&mut plan, invite);
        return Ok(plan);
    }

    let chat = active_group(snap, invite.chat)?;
    if chat.is_member(actor) {
        return Err(Denial::AlreadyMember);
    }
    if snap.blocked_either(invite.inviter, invite.invitee) {
        return Err(Denial::Blocked);
    }

    let mut updated = chat.clone();
    updated.members.push(Membership {
        user: actor,
        role: Role::Member,
        joined_at: ctx.now,
    });

    let mut plan = Plan::new(Some(updated.clone()));
    drop_invite(&mut plan, invite);
    put_chat(&mut plan, updated, EntityKind::Membership, ChangeKind::Created);
    Ok(plan)
}

/// Withdraw a pending invite.  Allowed for the inviter and for the chat's
/// owner and moderators.
pub fn revoke_invite(
    snap: &Snapshot,
    actor: UserId,
    invite_id: InviteId,
) -> Result<Plan<()>, Denial> {
    let invite = snap.invite(invite_id)?;
    if invite.inviter != actor {
        let moderates = snap
            .chat(invite.chat)
            .ok()
            .and_then(|c| c.role_of(actor))
            .is_some_and(Role::can_moderate);
        if !moderates {
            return Err(Denial::NotInviter);
        }
    }
    let mut plan = Plan::new(());
    drop_invite(&mut plan, invite);
    Ok(plan)
}

// ---------------------------------------------------------------------------
// Membership changes
// ---------------------------------------------------------------------------

/// Remove `target` from a group.  The actor must strictly outrank the
/// target; the owner can never be removed this way.
pub fn remove_member(
    snap: &Snapshot,
    actor: UserId,
    chat_id: ChatId,
    target: UserId,
) -> Result<Plan<()>, Denial> {
    let chat = active_group(snap, chat_id)?;
    let actor_rank = actor_role(chat, actor)?;
    if actor == target {
        return Err(Denial::CannotRemoveSelf);
    }
    let target_rank = chat.role_of(target).ok_or(Denial::MemberNotFound)?;
    if target_rank == Role::Owner {
        return Err(Denial::TargetIsOwner);
    }
    if !actor_rank.can_moderate() || actor_rank <= target_rank {
        return Err(Denial::InsufficientRank);
    }

    let mut updated = chat.clone();
    updated.members.retain(|m| m.user != target);

    let mut plan = Plan::new(());
    put_chat(&mut plan, updated, EntityKind::Membership, ChangeKind::Deleted);
    Ok(plan)
}

/// The member who inherits a group when its owner leaves: the
/// longest-tenured moderator, else the longest-tenured member.
pub fn successor(chat: &Chat, leaving: UserId) -> Option<UserId> {
    let remaining = || chat.members.iter().filter(move |m| m.user != leaving);
    remaining()
        .find(|m| m.role == Role::Moderator)
        .or_else(|| remaining().next())
        .map(|m| m.user)
}

pub fn leave_chat(
    snap: &Snapshot,
    actor: UserId,
    chat_id: ChatId,
) -> Result<Plan<LeaveSummary>, Denial> {
    let chat = active_group(snap, chat_id)?;
    let role = actor_role(chat, actor)?;

    let mut updated = chat.clone();
    updated.members.retain(|m| m.user != actor);
    let mut summary = LeaveSummary {
        new_owner: None,
        dissolved: false,
    };
    let mut plan = Plan::new(summary);

    if updated.members.is_empty() {
        summary.dissolved = true;
        updated.state = ChatState::Dissolved;
        updated.pinned = None;
        for invite in snap.invites_for_chat(chat_id) {
            drop_invite(&mut plan, invite);
        }
        put_chat(&mut plan, updated, EntityKind::Chat, ChangeKind::Deleted);
    } else if role == Role::Owner {
        // remaining members are non-empty, so a successor always exists
        if let Some(heir) = successor(chat, actor) {
            for m in updated.members.iter_mut().filter(|m| m.user == heir) {
                m.role = Role::Owner;
            }
            if let ChatKind::Group { owner, .. } = &mut updated.kind {
                *owner = heir;
            }
            summary.new_owner = Some(heir);
        }
        put_chat(&mut plan, updated, EntityKind::Chat, ChangeKind::Updated);
        plan.event(
            EntityKind::Membership,
            EntityId::Chat(chat_id),
            ChangeKind::Deleted,
        );
    } else {
        put_chat(&mut plan, updated, EntityKind::Membership, ChangeKind::Deleted);
    }

    plan.value = summary;
    Ok(plan)
}

/// Promote or demote `target`.  Owner only.
pub fn set_moderator(
    snap: &Snapshot,
    actor: UserId,
    chat_id: ChatId,
    target: UserId,
    is_mod: bool,
) -> Result<Plan<()>, Denial> {
    let chat = active_group(snap, chat_id)?;
    if actor_role(chat, actor)? != Role::Owner {
        return Err(Denial::NotOwner);
    }
    let current = chat.role_of(target).ok_or(Denial::MemberNotFound)?;
    let next = match (current, is_mod) {
        (Role::Owner, _) => return Err(Denial::TargetIsOwner),
        (Role::Moderator, true) => return Err(Denial::AlreadyModerator),
        (Role::Member, false) => return Err(Denial::NotAModerator),
        (_, true) => Role::Moderator,
        (_, false) => Role::Member,
    };

    let mut updated = chat.clone();
    for m in updated.members.iter_mut().filter(|m| m.user == target) {
        m.role = next;
    }
    let mut plan = Plan::new(());
    put_chat(&mut plan, updated, EntityKind::Membership, ChangeKind::Updated);
    Ok(plan)
}

/// Rename a group or change its avatar.  Owner or moderator.
pub fn update_group_settings(
    snap: &Snapshot,
    ctx: Ctx<'_>,
    actor: UserId,
    chat_id: ChatId,
    settings: &GroupSettings,
) -> Result<Plan<Chat>, Denial> {
    let chat = active_group(snap, chat_id)?;
    if !actor_role(chat, actor)?.can_moderate() {
        return Err(Denial::NotModerator);
    }

    let mut updated = chat.clone();
    if let ChatKind::Group { name, avatar: current, .. } = &mut updated.kind {
        if let Some(new_name) = &settings.name {
            *name = validate_name(new_name, ctx.config.max_group_name_len)?;
        }
        match &settings.avatar {
            AvatarUpdate::Keep => {}
            AvatarUpdate::Clear => *current = None,
            AvatarUpdate::Set(bytes) => {
                avatar::validate(bytes, ctx.config.max_avatar_bytes)?;
                *current = Some(bytes.clone());
            }
        }
    }

    let mut plan = Plan::new(updated.clone());
    if updated != *chat {
        put_chat(&mut plan, updated, EntityKind::Chat, ChangeKind::Updated);
    }
    Ok(plan)
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Role of every member in tenure order.
pub fn membership(chat: &Chat) -> Vec<(UserId, Role)> {
    chat.members.iter().map(|m| (m.user, m.role)).collect()
}

/// Groups `actor` could invite `target` into.  The snapshot must cover the
/// actor's chats and the pair `{actor, target}`.
pub fn invitable_groups(snap: &Snapshot, actor: UserId, target: UserId) -> Vec<Chat> {
    if actor == target || snap.blocked_either(actor, target) {
        return Vec::new();
    }
    let mut chats: Vec<Chat> = snap
        .chats
        .values()
        .filter(|c| !c.is_direct() && c.is_active())
        .filter(|c| c.is_member(actor) && !c.is_member(target))
        .filter(|c| !snap.invites_for_chat(c.id).any(|i| i.invitee == target))
        .cloned()
        .collect();
    chats.sort_by(|a, b| a.name().cmp(&b.name()));
    chats
}
