//! CRUD operations for [`User`] records.

use rusqlite::{params, OptionalExtension};

use hearth_shared::{User, UserId};

use crate::database::{parse_id, parse_ts, ts, Database};
use crate::error::{Result, StoreError};

const USER_COLUMNS: &str = "id, username, display_name, avatar, created_at";

impl Database {
    /// Register a new user.  Fails if the id or username is taken.
    pub fn create_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, username, display_name, avatar, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id.to_string(),
                user.username,
                user.display_name,
                user.avatar,
                ts(user.created_at),
            ],
        )?;
        Ok(())
    }

    /// Profile edits.  The username is immutable.
    pub fn update_user(&self, user: &User) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET display_name = ?2, avatar = ?3 WHERE id = ?1",
            params![user.id.to_string(), user.display_name, user.avatar],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(4)?;

    Ok(User {
        id: parse_id(0, &id)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        avatar: row.get(3)?,
        created_at: parse_ts(4, &created_at)?,
    })
}
