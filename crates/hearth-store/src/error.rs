use thiserror::Error;

use hearth_core::PersistenceError;

/// Failures of the SQLite layer.  The engine only ever sees them wrapped in
/// a [`PersistenceError`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("No platform data directory for the database")]
    NoDataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An update addressed a row that does not exist.
    #[error("Row not found")]
    NotFound,

    #[error("Migration failed: {0}")]
    Migration(String),

    /// The connection mutex was poisoned by a panicking holder.
    #[error("Connection lock poisoned")]
    Poisoned,
}

impl From<StoreError> for PersistenceError {
    fn from(err: StoreError) -> Self {
        PersistenceError::new(err)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
