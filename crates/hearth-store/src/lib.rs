//! # hearth-store
//!
//! SQLite persistence for the Hearth policy engine.
//!
//! [`Database`] wraps a `rusqlite::Connection`, runs the schema migrations
//! and provides typed CRUD helpers for every domain record.
//! [`SqliteStore`] puts a connection behind a mutex and implements the
//! engine's snapshot/commit seam, with per-scope revision counters kept in
//! the same database.

pub mod chats;
pub mod database;
pub mod graph;
pub mod messages;
pub mod migrations;
pub mod revisions;
pub mod store;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use store::SqliteStore;
