//! The SQLite connection and the column codecs shared by the CRUD modules.
//!
//! Opening a [`Database`] always migrates the schema first, so every other
//! method can assume the current layout.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use directories::ProjectDirs;
use rusqlite::types::Type;
use rusqlite::Connection;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::migrations;

const DB_FILE: &str = "hearth.db";

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open `hearth.db` in the platform data directory, e.g.
    /// `~/.local/share/hearth/` on Linux.
    pub fn new() -> Result<Self> {
        let dirs = ProjectDirs::from("com", "hearth", "hearth").ok_or(StoreError::NoDataDir)?;
        std::fs::create_dir_all(dirs.data_dir())?;
        let path = dirs.data_dir().join(DB_FILE);
        tracing::info!(path = %path.display(), "opening database");
        Self::open_at(&path)
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::prepare(conn)
    }

    /// Private database that disappears with the handle.
    pub fn open_in_memory() -> Result<Self> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// File backing the database, `None` when in memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.conn
            .path()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }
}

// ---------------------------------------------------------------------------
// Column codecs shared by the row mappers
// ---------------------------------------------------------------------------

/// Timestamps are stored as fixed-width RFC-3339 UTC so text order matches
/// time order.
pub(crate) fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_opt_ts(idx: usize, s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_ts(idx, &s)).transpose()
}

/// Parse a UUID column into any of the id newtypes.
pub(crate) fn parse_id<T: From<Uuid>>(idx: usize, s: &str) -> rusqlite::Result<T> {
    Uuid::from_str(s)
        .map(T::from)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_opt_id<T: From<Uuid>>(idx: usize, s: Option<String>) -> rusqlite::Result<Option<T>> {
    s.map(|s| parse_id(idx, &s)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        let db = Database::open_at(&path).expect("should open");
        assert!(db.path().is_some());

        let version: u32 = db
            .conn()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn in_memory_is_migrated_and_pathless() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.path().is_none());
        assert!(db.get_user(hearth_shared::UserId::new()).unwrap().is_none());
    }

    #[test]
    fn timestamps_sort_as_text() {
        let early = Utc::now();
        let late = early + chrono::Duration::microseconds(1);
        assert!(ts(early) < ts(late));
        assert_eq!(parse_ts(0, &ts(early)).unwrap(), early);
    }
}
