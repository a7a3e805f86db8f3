//! Schema migrations, applied in order when a [`Database`] is opened.
//!
//! The schema version lives in SQLite's `user_version` pragma.  Each entry
//! of [`MIGRATIONS`] moves the schema from `version - 1` to `version` and
//! runs inside its own transaction together with the pragma bump.
//!
//! [`Database`]: crate::Database

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

struct Migration {
    version: u32,
    name: &'static str,
    up: fn(&Connection) -> rusqlite::Result<()>,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "v001_initial",
    up: v001_initial::up,
}];

/// Bring the schema behind `conn` up to the newest version.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let found: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    let latest = MIGRATIONS.last().map_or(0, |m| m.version);
    tracing::debug!(found, latest, "schema version");

    for migration in MIGRATIONS.iter().filter(|m| m.version > found) {
        tracing::info!(version = migration.version, name = migration.name, "migrating schema");
        let tx = conn.unchecked_transaction()?;
        (migration.up)(&tx)
            .map_err(|e| StoreError::Migration(format!("{}: {e}", migration.name)))?;
        tx.pragma_update(None, "user_version", migration.version)?;
        tx.commit()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rerunning_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
