//! Friendships, friend requests and blocks.

use rusqlite::{params, OptionalExtension};

use hearth_shared::{Block, FriendRequest, FriendRequestId, Friendship, UserId, UserPair};

use crate::database::{parse_id, parse_ts, ts, Database};
use crate::error::Result;

impl Database {
    // ------------------------------------------------------------------
    // Friendships
    // ------------------------------------------------------------------

    pub fn put_friendship(&self, friendship: &Friendship) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO friendships (user_low, user_high, since)
             VALUES (?1, ?2, ?3)",
            params![
                friendship.pair.low().to_string(),
                friendship.pair.high().to_string(),
                ts(friendship.since),
            ],
        )?;
        Ok(())
    }

    pub fn delete_friendship(&self, pair: UserPair) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM friendships WHERE user_low = ?1 AND user_high = ?2",
            params![pair.low().to_string(), pair.high().to_string()],
        )?;
        Ok(affected > 0)
    }

    pub fn get_friendship(&self, pair: UserPair) -> Result<Option<Friendship>> {
        let friendship = self
            .conn()
            .query_row(
                "SELECT user_low, user_high, since FROM friendships
                 WHERE user_low = ?1 AND user_high = ?2",
                params![pair.low().to_string(), pair.high().to_string()],
                row_to_friendship,
            )
            .optional()?;
        Ok(friendship)
    }

    pub fn friendships_of(&self, user: UserId) -> Result<Vec<Friendship>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_low, user_high, since FROM friendships
             WHERE user_low = ?1 OR user_high = ?1",
        )?;
        let rows = stmt.query_map(params![user.to_string()], row_to_friendship)?;

        let mut friendships = Vec::new();
        for row in rows {
            friendships.push(row?);
        }
        Ok(friendships)
    }

    // ------------------------------------------------------------------
    // Friend requests
    // ------------------------------------------------------------------

    pub fn put_friend_request(&self, request: &FriendRequest) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO friend_requests (id, sender, receiver, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                request.id.to_string(),
                request.sender.to_string(),
                request.receiver.to_string(),
                ts(request.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn delete_friend_request(&self, id: FriendRequestId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM friend_requests WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    pub fn get_friend_request(&self, id: FriendRequestId) -> Result<Option<FriendRequest>> {
        let request = self
            .conn()
            .query_row(
                "SELECT id, sender, receiver, created_at FROM friend_requests WHERE id = ?1",
                params![id.to_string()],
                row_to_request,
            )
            .optional()?;
        Ok(request)
    }

    /// Requests between the pair, in either direction.
    pub fn requests_between(&self, pair: UserPair) -> Result<Vec<FriendRequest>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, sender, receiver, created_at FROM friend_requests
             WHERE (sender = ?1 AND receiver = ?2) OR (sender = ?2 AND receiver = ?1)",
        )?;
        let rows = stmt.query_map(
            params![pair.low().to_string(), pair.high().to_string()],
            row_to_request,
        )?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }

    /// Incoming and outgoing requests of a user, oldest first.
    pub fn requests_of(&self, user: UserId) -> Result<Vec<FriendRequest>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, sender, receiver, created_at FROM friend_requests
             WHERE sender = ?1 OR receiver = ?1
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![user.to_string()], row_to_request)?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    pub fn put_block(&self, block: &Block) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO blocks (blocker, blocked, created_at)
             VALUES (?1, ?2, ?3)",
            params![
                block.blocker.to_string(),
                block.blocked.to_string(),
                ts(block.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn delete_block(&self, blocker: UserId, blocked: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM blocks WHERE blocker = ?1 AND blocked = ?2",
            params![blocker.to_string(), blocked.to_string()],
        )?;
        Ok(affected > 0)
    }

    pub fn get_block(&self, blocker: UserId, blocked: UserId) -> Result<Option<Block>> {
        let block = self
            .conn()
            .query_row(
                "SELECT blocker, blocked, created_at FROM blocks
                 WHERE blocker = ?1 AND blocked = ?2",
                params![blocker.to_string(), blocked.to_string()],
                row_to_block,
            )
            .optional()?;
        Ok(block)
    }

    /// Blocks placed by or against `user`.
    pub fn blocks_of(&self, user: UserId) -> Result<Vec<Block>> {
        let mut stmt = self.conn().prepare(
            "SELECT blocker, blocked, created_at FROM blocks
             WHERE blocker = ?1 OR blocked = ?1",
        )?;
        let rows = stmt.query_map(params![user.to_string()], row_to_block)?;

        let mut blocks = Vec::new();
        for row in rows {
            blocks.push(row?);
        }
        Ok(blocks)
    }
}

fn row_to_friendship(row: &rusqlite::Row<'_>) -> rusqlite::Result<Friendship> {
    let low: String = row.get(0)?;
    let high: String = row.get(1)?;
    let since: String = row.get(2)?;

    Ok(Friendship {
        pair: UserPair::new(parse_id(0, &low)?, parse_id(1, &high)?),
        since: parse_ts(2, &since)?,
    })
}

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<FriendRequest> {
    let id: String = row.get(0)?;
    let sender: String = row.get(1)?;
    let receiver: String = row.get(2)?;
    let created_at: String = row.get(3)?;

    Ok(FriendRequest {
        id: parse_id(0, &id)?,
        sender: parse_id(1, &sender)?,
        receiver: parse_id(2, &receiver)?,
        created_at: parse_ts(3, &created_at)?,
    })
}

fn row_to_block(row: &rusqlite::Row<'_>) -> rusqlite::Result<Block> {
    let blocker: String = row.get(0)?;
    let blocked: String = row.get(1)?;
    let created_at: String = row.get(2)?;

    Ok(Block {
        blocker: parse_id(0, &blocker)?,
        blocked: parse_id(1, &blocked)?,
        created_at: parse_ts(2, &created_at)?,
    })
}
