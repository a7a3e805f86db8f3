//! Message lifecycle: send, edit, delete, pin.
//!
//! A message moves `Active -> Edited* -> Deleted`.  Deletion tombstones the
//! content but keeps the record so the ordering of the chat is preserved.
//! Each chat has at most one pinned message.

use chrono::Duration;

use hearth_shared::events::{ChangeKind, EntityId, EntityKind};
use hearth_shared::{Chat, ChatId, Denial, Message, MessageId, UserId};

use crate::graph;
use crate::plan::{Ctx, Plan};
use crate::store::{Snapshot, WriteOp};

fn validate_content(content: &str, max: usize) -> Result<(), Denial> {
    if content.trim().is_empty() {
        return Err(Denial::EmptyContent);
    }
    let len = content.chars().count();
    if len > max {
        return Err(Denial::ContentTooLong { len, max });
    }
    Ok(())
}

fn active_chat(snap: &Snapshot, id: ChatId) -> Result<&Chat, Denial> {
    let chat = snap.chat(id)?;
    if !chat.is_active() {
        return Err(Denial::ChatDissolved);
    }
    Ok(chat)
}

fn moderates(chat: &Chat, actor: UserId) -> bool {
    chat.role_of(actor).is_some_and(|r| r.can_moderate())
}

fn put_message<T>(plan: &mut Plan<T>, message: Message, change: ChangeKind) {
    let id = message.id;
    plan.write(WriteOp::PutMessage(message))
        .event(EntityKind::Message, EntityId::Message(id), change);
}

/// Post `content` to a chat.  For a direct chat the snapshot must also
/// cover the participant pair so blocks can be honoured.
pub fn send(
    snap: &Snapshot,
    ctx: Ctx<'_>,
    actor: UserId,
    chat_id: ChatId,
    content: &str,
) -> Result<Plan<Message>, Denial> {
    let chat = active_chat(snap, chat_id)?;
    if !chat.is_member(actor) {
        return Err(Denial::NotMember);
    }
    if let Some(pair) = chat.direct_pair() {
        let other = pair.other(actor).unwrap_or(actor);
        if !graph::can_direct_message(snap, actor, other) {
            return Err(Denial::Blocked);
        }
    }
    validate_content(content, ctx.config.max_message_len)?;

    // strictly after the newest message, even if the clock went back
    let sent_at = match chat.last_sent_at {
        Some(last) if last >= ctx.now => last + Duration::microseconds(1),
        _ => ctx.now,
    };
    let message = Message {
        id: MessageId::new(),
        chat: chat_id,
        sender: actor,
        content: content.to_string(),
        sent_at,
        edited_at: None,
        pinned: false,
        deleted_at: None,
    };

    let mut updated = chat.clone();
    updated.last_sent_at = Some(sent_at);

    let mut plan = Plan::new(message.clone());
    put_message(&mut plan, message, ChangeKind::Created);
    plan.write(WriteOp::PutChat(updated));
    Ok(plan)
}

pub fn edit(
    snap: &Snapshot,
    ctx: Ctx<'_>,
    actor: UserId,
    message_id: MessageId,
    content: &str,
) -> Result<Plan<Message>, Denial> {
    let message = snap.message(message_id)?;
    active_chat(snap, message.chat)?;
    if message.sender != actor {
        return Err(Denial::NotSender);
    }
    if message.is_deleted() {
        return Err(Denial::MessageDeleted);
    }
    validate_content(content, ctx.config.max_message_len)?;

    let mut edited = message.clone();
    edited.content = content.to_string();
    edited.edited_at = Some(ctx.now);

    let mut plan = Plan::new(edited.clone());
    put_message(&mut plan, edited, ChangeKind::Updated);
    Ok(plan)
}

/// Tombstone a message.  The sender may delete their own messages; owners
/// and moderators may delete anyone's.
pub fn delete(
    snap: &Snapshot,
    ctx: Ctx<'_>,
    actor: UserId,
    message_id: MessageId,
) -> Result<Plan<Message>, Denial> {
    let message = snap.message(message_id)?;
    let chat = active_chat(snap, message.chat)?;
    if message.sender != actor && !moderates(chat, actor) {
        return Err(Denial::NotModerator);
    }
    if message.is_deleted() {
        return Err(Denial::MessageDeleted);
    }

    let mut tombstone = message.clone();
    tombstone.content.clear();
    tombstone.pinned = false;
    tombstone.deleted_at = Some(ctx.now);

    let mut plan = Plan::new(tombstone.clone());
    put_message(&mut plan, tombstone, ChangeKind::Deleted);
    if chat.pinned == Some(message_id) {
        let mut updated = chat.clone();
        updated.pinned = None;
        plan.write(WriteOp::PutChat(updated))
            .event(EntityKind::Chat, EntityId::Chat(chat.id), ChangeKind::Updated);
    }
    Ok(plan)
}

/// Pin or unpin.  Pinning replaces the chat's previous pin; unpinning a
/// message that is not pinned is a successful no-op.  Returns the message
/// that lost its pin, if any.
pub fn pin(
    snap: &Snapshot,
    actor: UserId,
    message_id: MessageId,
    pinned: bool,
) -> Result<Plan<Option<MessageId>>, Denial> {
    let message = snap.message(message_id)?;
    let chat = active_chat(snap, message.chat)?;
    if !moderates(chat, actor) {
        return Err(Denial::NotModerator);
    }
    if message.is_deleted() {
        return Err(Denial::MessageDeleted);
    }

    let mut updated_chat = chat.clone();

    if !pinned {
        if chat.pinned != Some(message_id) {
            return Ok(Plan::new(None));
        }
        let mut unpinned = message.clone();
        unpinned.pinned = false;
        updated_chat.pinned = None;

        let mut plan = Plan::new(Some(message_id));
        put_message(&mut plan, unpinned, ChangeKind::Updated);
        plan.write(WriteOp::PutChat(updated_chat))
            .event(EntityKind::Chat, EntityId::Chat(chat.id), ChangeKind::Updated);
        return Ok(plan);
    }

    if chat.pinned == Some(message_id) {
        return Err(Denial::AlreadyPinned);
    }

    let mut plan = Plan::new(chat.pinned);
    if let Some(previous) = chat.pinned.and_then(|id| snap.messages.get(&id)) {
        let mut unpinned = previous.clone();
        unpinned.pinned = false;
        put_message(&mut plan, unpinned, ChangeKind::Updated);
    }
    let mut pinned_message = message.clone();
    pinned_message.pinned = true;
    put_message(&mut plan, pinned_message, ChangeKind::Updated);

    updated_chat.pinned = Some(message_id);
    plan.write(WriteOp::PutChat(updated_chat))
        .event(EntityKind::Chat, EntityId::Chat(chat.id), ChangeKind::Updated);
    Ok(plan)
}

/// Messages of a chat in order, visible to its members.  A dissolved chat
/// has no members left, so its history stays readable to anyone who posted
/// in it.
pub fn list(snap: &Snapshot, actor: UserId, chat_id: ChatId) -> Result<Vec<Message>, Denial> {
    let chat = snap.chat(chat_id)?;
    let messages = snap.chat_messages(chat_id);
    let readable = chat.is_member(actor)
        || (!chat.is_active() && messages.iter().any(|m| m.sender == actor));
    if !readable {
        return Err(Denial::NotMember);
    }
    Ok(messages.into_iter().cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat;
    use crate::config::EngineConfig;
    use chrono::Utc;
    use hearth_shared::{Block, Role, User};

    struct Fixture {
        snap: Snapshot,
        owner: UserId,
        moderator: UserId,
        member: UserId,
        group: ChatId,
        config: EngineConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let mut snap = Snapshot::default();
            let users: Vec<User> = ["owner", "moderator", "member"]
                .into_iter()
                .map(User::new)
                .collect();
            for u in &users {
                snap.users.insert(u.id, u.clone());
            }
            let config = EngineConfig::default();
            let ctx = Ctx {
                now: Utc::now(),
                config: &config,
            };
            let plan =
                chat::create_group_chat(&snap, ctx, users[0].id, "g", &[users[1].id, users[2].id])
                    .unwrap();
            let mut group = plan.value;
            group.members[1].role = Role::Moderator;
            let group_id = group.id;
            snap.chats.insert(group_id, group);

            Self {
                snap,
                owner: users[0].id,
                moderator: users[1].id,
                member: users[2].id,
                group: group_id,
                config,
            }
        }

        fn ctx(&self) -> Ctx<'_> {
            Ctx {
                now: Utc::now(),
                config: &self.config,
            }
        }

        fn apply<T>(&mut self, plan: &Plan<T>) {
            for op in &plan.ops {
                match op {
                    WriteOp::PutMessage(m) => {
                        self.snap.messages.insert(m.id, m.clone());
                    }
                    WriteOp::PutChat(c) => {
                        self.snap.chats.insert(c.id, c.clone());
                    }
                    other => panic!("unexpected op {other:?}"),
                }
            }
        }

        fn send(&mut self, actor: UserId, content: &str) -> MessageId {
            let plan = send(&self.snap, self.ctx(), actor, self.group, content).unwrap();
            let id = plan.value.id;
            self.apply(&plan);
            id
        }
    }

    #[test]
    fn send_requires_membership_and_content() {
        let mut f = Fixture::new();
        let outsider = User::new("outsider");
        f.snap.users.insert(outsider.id, outsider.clone());

        assert_eq!(
            send(&f.snap, f.ctx(), outsider.id, f.group, "hi").unwrap_err(),
            Denial::NotMember
        );
        assert_eq!(
            send(&f.snap, f.ctx(), f.member, f.group, "  \n").unwrap_err(),
            Denial::EmptyContent
        );
        let long = "x".repeat(f.config.max_message_len + 1);
        assert!(matches!(
            send(&f.snap, f.ctx(), f.member, f.group, &long),
            Err(Denial::ContentTooLong { .. })
        ));
    }

    #[test]
    fn sent_at_never_goes_backwards() {
        let mut f = Fixture::new();
        let first = f.send(f.member, "first");
        let first_at = f.snap.messages[&first].sent_at;

        let earlier = Ctx {
            now: first_at - Duration::minutes(5),
            config: &f.config,
        };
        let plan = send(&f.snap, earlier, f.member, f.group, "second").unwrap();
        assert!(plan.value.sent_at > first_at);
    }

    #[test]
    fn direct_messages_respect_blocks() {
        let mut f = Fixture::new();
        let dm = chat::new_direct_chat(f.owner, f.member, Utc::now());
        let dm_id = dm.id;
        f.snap.chats.insert(dm_id, dm);
        assert!(send(&f.snap, f.ctx(), f.owner, dm_id, "hello").is_ok());

        f.snap.blocks.insert(
            (f.member, f.owner),
            Block {
                blocker: f.member,
                blocked: f.owner,
                created_at: Utc::now(),
            },
        );
        assert_eq!(
            send(&f.snap, f.ctx(), f.owner, dm_id, "hello").unwrap_err(),
            Denial::Blocked
        );
    }

    #[test]
    fn only_sender_edits_and_deleted_messages_are_frozen() {
        let mut f = Fixture::new();
        let id = f.send(f.member, "hello");

        assert_eq!(
            edit(&f.snap, f.ctx(), f.owner, id, "x").unwrap_err(),
            Denial::NotSender
        );
        let plan = edit(&f.snap, f.ctx(), f.member, id, "hello again").unwrap();
        assert!(plan.value.edited_at.is_some());
        f.apply(&plan);

        let plan = delete(&f.snap, f.ctx(), f.moderator, id).unwrap();
        f.apply(&plan);
        let tombstone = &f.snap.messages[&id];
        assert!(tombstone.is_deleted());
        assert!(tombstone.content.is_empty());

        let err = edit(&f.snap, f.ctx(), f.member, id, "x").unwrap_err();
        assert_eq!(err, Denial::MessageDeleted);
        assert_eq!(err.kind(), hearth_shared::DenialKind::InvalidState);
        assert_eq!(
            delete(&f.snap, f.ctx(), f.member, id).unwrap_err(),
            Denial::MessageDeleted
        );
    }

    #[test]
    fn plain_members_cannot_delete_others() {
        let mut f = Fixture::new();
        let id = f.send(f.moderator, "mine");
        assert_eq!(
            delete(&f.snap, f.ctx(), f.member, id).unwrap_err(),
            Denial::NotModerator
        );
        assert!(delete(&f.snap, f.ctx(), f.moderator, id).is_ok());
    }

    #[test]
    fn pin_is_exclusive() {
        let mut f = Fixture::new();
        let m1 = f.send(f.member, "one");
        let m2 = f.send(f.member, "two");

        assert_eq!(pin(&f.snap, f.member, m1, true).unwrap_err(), Denial::NotModerator);

        let plan = pin(&f.snap, f.owner, m1, true).unwrap();
        assert_eq!(plan.value, None);
        f.apply(&plan);
        assert_eq!(pin(&f.snap, f.owner, m1, true).unwrap_err(), Denial::AlreadyPinned);

        let plan = pin(&f.snap, f.moderator, m2, true).unwrap();
        assert_eq!(plan.value, Some(m1));
        f.apply(&plan);

        let pinned: Vec<_> = f.snap.messages.values().filter(|m| m.pinned).map(|m| m.id).collect();
        assert_eq!(pinned, vec![m2]);
        assert_eq!(f.snap.chats[&f.group].pinned, Some(m2));
    }

    #[test]
    fn unpin_is_idempotent_and_delete_clears_pin() {
        let mut f = Fixture::new();
        let id = f.send(f.member, "pin me");
        assert!(pin(&f.snap, f.owner, id, false).unwrap().is_noop());

        let plan = pin(&f.snap, f.owner, id, true).unwrap();
        f.apply(&plan);
        let plan = delete(&f.snap, f.ctx(), f.member, id).unwrap();
        f.apply(&plan);
        assert_eq!(f.snap.chats[&f.group].pinned, None);
        assert_eq!(pin(&f.snap, f.owner, id, true).unwrap_err(), Denial::MessageDeleted);
    }

    #[test]
    fn list_is_ordered_and_members_only() {
        let mut f = Fixture::new();
        let a = f.send(f.member, "a");
        let b = f.send(f.owner, "b");
        let ids: Vec<_> = list(&f.snap, f.moderator, f.group)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![a, b]);

        let outsider = UserId::new();
        assert_eq!(list(&f.snap, outsider, f.group).unwrap_err(), Denial::NotMember);
    }

    #[test]
    fn dissolved_history_stays_with_its_senders() {
        let mut f = Fixture::new();
        let said = f.send(f.member, "bye all");
        for actor in [f.moderator, f.member, f.owner] {
            let plan = chat::leave_chat(&f.snap, actor, f.group).unwrap();
            f.apply(&plan);
        }
        assert!(!f.snap.chats[&f.group].is_active());

        let ids: Vec<_> = list(&f.snap, f.member, f.group)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![said]);
        assert_eq!(list(&f.snap, f.moderator, f.group).unwrap_err(), Denial::NotMember);
        assert_eq!(list(&f.snap, UserId::new(), f.group).unwrap_err(), Denial::NotMember);
    }
}
