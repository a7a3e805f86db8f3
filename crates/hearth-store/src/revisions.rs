//! Per-scope revision counters backing optimistic concurrency.

use rusqlite::{params, OptionalExtension};

use hearth_core::store::ScopeKey;

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Current revision of `scope`, 0 if it was never written.
    pub fn revision(&self, scope: ScopeKey) -> Result<u64> {
        let revision: Option<i64> = self
            .conn()
            .query_row(
                "SELECT revision FROM scope_revisions WHERE scope = ?1",
                params![scope.key()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(revision.map_or(0, |r| r as u64))
    }

    pub fn bump_revision(&self, scope: ScopeKey) -> Result<()> {
        self.conn().execute(
            "INSERT INTO scope_revisions (scope, revision) VALUES (?1, 1)
             ON CONFLICT(scope) DO UPDATE SET revision = revision + 1",
            params![scope.key()],
        )?;
        Ok(())
    }
}
