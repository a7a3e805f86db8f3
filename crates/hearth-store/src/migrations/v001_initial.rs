//! v001 -- Initial schema creation.
//!
//! Users, the social graph (friendships, requests, blocks), chats with their
//! members and invites, messages, and the per-scope revision counters used
//! for optimistic concurrency.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    username     TEXT NOT NULL UNIQUE,
    display_name TEXT,
    avatar       BLOB,                        -- PNG or JPEG bytes
    created_at   TEXT NOT NULL                -- RFC-3339, UTC
);

-- ----------------------------------------------------------------
-- Social graph
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friendships (
    user_low   TEXT NOT NULL,                 -- smaller id of the pair
    user_high  TEXT NOT NULL,
    since      TEXT NOT NULL,
    PRIMARY KEY (user_low, user_high)
);

CREATE TABLE IF NOT EXISTS friend_requests (
    id         TEXT PRIMARY KEY NOT NULL,
    sender     TEXT NOT NULL,
    receiver   TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_friend_requests_sender   ON friend_requests(sender);
CREATE INDEX IF NOT EXISTS idx_friend_requests_receiver ON friend_requests(receiver);

CREATE TABLE IF NOT EXISTS blocks (
    blocker    TEXT NOT NULL,
    blocked    TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (blocker, blocked)
);

CREATE INDEX IF NOT EXISTS idx_blocks_blocked ON blocks(blocked);

-- ----------------------------------------------------------------
-- Chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    id           TEXT PRIMARY KEY NOT NULL,
    kind         TEXT NOT NULL,               -- 'direct' | 'group'
    name         TEXT,                        -- groups only
    owner        TEXT,                        -- groups only
    avatar       BLOB,                        -- groups only
    direct_low   TEXT,                        -- direct chats only
    direct_high  TEXT,
    state        TEXT NOT NULL,               -- 'active' | 'dissolved'
    pinned       TEXT,                        -- message id
    last_sent_at TEXT,
    created_at   TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_chats_direct_pair
    ON chats(direct_low, direct_high) WHERE kind = 'direct';

CREATE TABLE IF NOT EXISTS chat_members (
    chat_id   TEXT NOT NULL,
    user_id   TEXT NOT NULL,
    role      TEXT NOT NULL,                  -- 'owner' | 'moderator' | 'member'
    position  INTEGER NOT NULL,               -- tenure order
    joined_at TEXT NOT NULL,
    PRIMARY KEY (chat_id, user_id),
    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_chat_members_user ON chat_members(user_id);

CREATE TABLE IF NOT EXISTS invites (
    id         TEXT PRIMARY KEY NOT NULL,
    chat_id    TEXT NOT NULL,
    inviter    TEXT NOT NULL,
    invitee    TEXT NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_invites_chat ON invites(chat_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id         TEXT PRIMARY KEY NOT NULL,
    chat_id    TEXT NOT NULL,
    sender     TEXT NOT NULL,
    content    TEXT NOT NULL,                 -- empty once deleted
    sent_at    TEXT NOT NULL,
    edited_at  TEXT,
    pinned     INTEGER NOT NULL DEFAULT 0,    -- boolean 0/1
    deleted_at TEXT,
    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_sent
    ON messages(chat_id, sent_at);

-- ----------------------------------------------------------------
-- Optimistic concurrency
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS scope_revisions (
    scope    TEXT PRIMARY KEY NOT NULL,       -- e.g. 'pair:<low>:<high>'
    revision INTEGER NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
