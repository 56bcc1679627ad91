//! Graph database bootstrap.
//!
//! Every connection the repositories accept comes from [`open_db`] or
//! [`open_db_in_memory`]: foreign keys enforced, busy timeout set, schema
//! migrated to [`migrations::latest_version`].
//!
//! # Invariants
//! - `note_links` rows never outlive either endpoint note (`ON DELETE CASCADE`).
//! - A database stamped by a newer binary is refused, not downgraded.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Failure to open, configure, or migrate a graph database.
#[derive(Debug)]
pub enum DbError {
    /// Connection-level failure: open, pragma, or version read.
    Sqlite(rusqlite::Error),
    /// One migration script failed; no pending migration was applied.
    Migration {
        version: u32,
        source: rusqlite::Error,
    },
    /// `PRAGMA user_version` is ahead of the migrations this binary ships.
    SchemaTooNew { found: u32, supported: u32 },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "graph database error: {err}"),
            Self::Migration { version, source } => {
                write!(f, "graph migration {version} failed: {source}")
            }
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "graph schema version {found} is newer than supported {supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) | Self::Migration { source: err, .. } => Some(err),
            Self::SchemaTooNew { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
