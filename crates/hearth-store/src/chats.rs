//! Chats, their members and pending invites.

use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension};

use hearth_shared::{
    Chat, ChatId, ChatKind, ChatState, GroupInvite, InviteId, Membership, Role, UserId, UserPair,
};

use crate::database::{parse_id, parse_opt_id, parse_opt_ts, parse_ts, ts, Database};
use crate::error::Result;

const CHAT_COLUMNS: &str = "id, kind, name, owner, avatar, state, pinned, last_sent_at, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Chats
    // ------------------------------------------------------------------

    /// Insert or update a chat and replace its member list.
    pub fn put_chat(&self, chat: &Chat) -> Result<()> {
        let (kind, name, owner, avatar) = match &chat.kind {
            ChatKind::Direct => ("direct", None, None, None),
            ChatKind::Group {
                name,
                owner,
                avatar,
            } => (
                "group",
                Some(name.as_str()),
                Some(owner.to_string()),
                avatar.as_deref(),
            ),
        };
        let pair = chat.direct_pair();

        self.conn().execute(
            "INSERT INTO chats
                (id, kind, name, owner, avatar, direct_low, direct_high,
                 state, pinned, last_sent_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                owner = excluded.owner,
                avatar = excluded.avatar,
                state = excluded.state,
                pinned = excluded.pinned,
                last_sent_at = excluded.last_sent_at",
            params![
                chat.id.to_string(),
                kind,
                name,
                owner,
                avatar,
                pair.map(|p| p.low().to_string()),
                pair.map(|p| p.high().to_string()),
                state_str(chat.state),
                chat.pinned.map(|m| m.to_string()),
                chat.last_sent_at.map(ts),
                ts(chat.created_at),
            ],
        )?;

        self.conn().execute(
            "DELETE FROM chat_members WHERE chat_id = ?1",
            params![chat.id.to_string()],
        )?;
        let mut stmt = self.conn().prepare(
            "INSERT INTO chat_members (chat_id, user_id, role, position, joined_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (position, member) in chat.members.iter().enumerate() {
            stmt.execute(params![
                chat.id.to_string(),
                member.user.to_string(),
                member.role.as_str(),
                position as i64,
                ts(member.joined_at),
            ])?;
        }
        Ok(())
    }

    pub fn get_chat(&self, id: ChatId) -> Result<Option<Chat>> {
        let chat = self
            .conn()
            .query_row(
                &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?1"),
                params![id.to_string()],
                row_to_chat,
            )
            .optional()?;
        self.with_members(chat)
    }

    pub fn direct_chat_for(&self, pair: UserPair) -> Result<Option<Chat>> {
        let chat = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {CHAT_COLUMNS} FROM chats
                     WHERE kind = 'direct' AND direct_low = ?1 AND direct_high = ?2"
                ),
                params![pair.low().to_string(), pair.high().to_string()],
                row_to_chat,
            )
            .optional()?;
        self.with_members(chat)
    }

    /// Active chats `user` belongs to.
    pub fn active_chats_of(&self, user: UserId) -> Result<Vec<Chat>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats
             WHERE state = 'active'
               AND id IN (SELECT chat_id FROM chat_members WHERE user_id = ?1)"
        ))?;
        let rows = stmt.query_map(params![user.to_string()], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            let mut chat = row?;
            chat.members = self.members_of(chat.id)?;
            chats.push(chat);
        }
        Ok(chats)
    }

    fn with_members(&self, chat: Option<Chat>) -> Result<Option<Chat>> {
        match chat {
            Some(mut chat) => {
                chat.members = self.members_of(chat.id)?;
                Ok(Some(chat))
            }
            None => Ok(None),
        }
    }

    /// Members in tenure order.
    fn members_of(&self, chat: ChatId) -> Result<Vec<Membership>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, role, joined_at FROM chat_members
             WHERE chat_id = ?1
             ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![chat.to_string()], row_to_member)?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    // ------------------------------------------------------------------
    // Invites
    // ------------------------------------------------------------------

    pub fn put_invite(&self, invite: &GroupInvite) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO invites (id, chat_id, inviter, invitee, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                invite.id.to_string(),
                invite.chat.to_string(),
                invite.inviter.to_string(),
                invite.invitee.to_string(),
                ts(invite.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn delete_invite(&self, id: InviteId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM invites WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }

    pub fn get_invite(&self, id: InviteId) -> Result<Option<GroupInvite>> {
        let invite = self
            .conn()
            .query_row(
                "SELECT id, chat_id, inviter, invitee, created_at FROM invites WHERE id = ?1",
                params![id.to_string()],
                row_to_invite,
            )
            .optional()?;
        Ok(invite)
    }

    pub fn invites_for_chat(&self, chat: ChatId) -> Result<Vec<GroupInvite>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, chat_id, inviter, invitee, created_at FROM invites
             WHERE chat_id = ?1
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![chat.to_string()], row_to_invite)?;

        let mut invites = Vec::new();
        for row in rows {
            invites.push(row?);
        }
        Ok(invites)
    }
}

fn state_str(state: ChatState) -> &'static str {
    match state {
        ChatState::Active => "active",
        ChatState::Dissolved => "dissolved",
    }
}

fn bad_column(idx: usize, what: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, what.into())
}

/// Maps the chat row; members are filled in separately.
fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let id: String = row.get(0)?;
    let kind: String = row.get(1)?;
    let name: Option<String> = row.get(2)?;
    let owner: Option<String> = row.get(3)?;
    let avatar: Option<Vec<u8>> = row.get(4)?;
    let state: String = row.get(5)?;
    let pinned: Option<String> = row.get(6)?;
    let last_sent_at: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;

    let kind = match kind.as_str() {
        "direct" => ChatKind::Direct,
        "group" => ChatKind::Group {
            name: name.unwrap_or_default(),
            owner: parse_opt_id(3, owner)?
                .ok_or_else(|| bad_column(3, "group chat without owner".into()))?,
            avatar,
        },
        other => return Err(bad_column(1, format!("unknown chat kind {other:?}"))),
    };
    let state = match state.as_str() {
        "active" => ChatState::Active,
        "dissolved" => ChatState::Dissolved,
        other => return Err(bad_column(5, format!("unknown chat state {other:?}"))),
    };

    Ok(Chat {
        id: parse_id(0, &id)?,
        kind,
        state,
        members: Vec::new(),
        pinned: parse_opt_id(6, pinned)?,
        last_sent_at: parse_opt_ts(7, last_sent_at)?,
        created_at: parse_ts(8, &created_at)?,
    })
}

fn row_to_member(row: &rusqlite::Row<'_>) -> rusqlite::Result<Membership> {
    let user: String = row.get(0)?;
    let role: String = row.get(1)?;
    let joined_at: String = row.get(2)?;

    Ok(Membership {
        user: parse_id(0, &user)?,
        role: Role::parse(&role).ok_or_else(|| bad_column(1, format!("unknown role {role:?}")))?,
        joined_at: parse_ts(2, &joined_at)?,
    })
}

fn row_to_invite(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupInvite> {
    let id: String = row.get(0)?;
    let chat: String = row.get(1)?;
    let inviter: String = row.get(2)?;
    let invitee: String = row.get(3)?;
    let created_at: String = row.get(4)?;

    Ok(GroupInvite {
        id: parse_id(0, &id)?,
        chat: parse_id(1, &chat)?,
        inviter: parse_id(2, &inviter)?,
        invitee: parse_id(3, &invitee)?,
        created_at: parse_ts(4, &created_at)?,
    })
}
