//! CRUD operations for [`Message`] records.

use rusqlite::{params, OptionalExtension};

use hearth_shared::{ChatId, Message, MessageId};

use crate::database::{parse_id, parse_opt_ts, parse_ts, ts, Database};
use crate::error::Result;

const MESSAGE_COLUMNS: &str = "id, chat_id, sender, content, sent_at, edited_at, pinned, deleted_at";

impl Database {
    /// Insert a message or overwrite an edited / pinned / deleted one.
    pub fn put_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages
                (id, chat_id, sender, content, sent_at, edited_at, pinned, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                edited_at = excluded.edited_at,
                pinned = excluded.pinned,
                deleted_at = excluded.deleted_at",
            params![
                message.id.to_string(),
                message.chat.to_string(),
                message.sender.to_string(),
                message.content,
                ts(message.sent_at),
                message.edited_at.map(ts),
                message.pinned,
                message.deleted_at.map(ts),
            ],
        )?;
        Ok(())
    }

    pub fn get_message(&self, id: MessageId) -> Result<Option<Message>> {
        let message = self
            .conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    /// Every message of a chat, oldest first.  Deleted messages are kept
    /// as tombstones.
    pub fn messages_for_chat(&self, chat: ChatId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE chat_id = ?1
             ORDER BY sent_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![chat.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let chat: String = row.get(1)?;
    let sender: String = row.get(2)?;
    let sent_at: String = row.get(4)?;

    Ok(Message {
        id: parse_id(0, &id)?,
        chat: parse_id(1, &chat)?,
        sender: parse_id(2, &sender)?,
        content: row.get(3)?,
        sent_at: parse_ts(4, &sent_at)?,
        edited_at: parse_opt_ts(5, row.get(5)?)?,
        pinned: row.get(6)?,
        deleted_at: parse_opt_ts(7, row.get(7)?)?,
    })
}
