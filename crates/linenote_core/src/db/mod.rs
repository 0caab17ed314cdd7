//! SQLite store bootstrap for the outline engine.
//!
//! # Responsibility
//! - Open and configure SQLite connections used by documents and repositories.
//! - Apply the `subject`/`category`/`content` schema migrations in order.
//!
//! # Invariants
//! - Schema version is tracked via `PRAGMA user_version`.
//! - Foreign keys are enforced, so a content row can never point at a
//!   category that does not exist.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Store-level failure, tagged with the bootstrap stage that produced it.
#[derive(Debug)]
pub enum DbError {
    /// A statement failed after the store was opened.
    Sqlite(rusqlite::Error),
    /// The store file or in-memory database could not be opened.
    Open {
        mode: &'static str,
        source: rusqlite::Error,
    },
    /// A connection setting (`foreign_keys`, `busy_timeout`) was refused.
    Setting {
        name: &'static str,
        source: rusqlite::Error,
    },
    /// Migration `version` failed; nothing from the pending set was applied.
    Migration {
        version: u32,
        source: rusqlite::Error,
    },
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Open { mode, source } => write!(f, "cannot open {mode} store: {source}"),
            Self::Setting { name, source } => {
                write!(f, "cannot apply connection setting {name}: {source}")
            }
            Self::Migration { version, source } => {
                write!(f, "migration {version:04} failed: {source}")
            }
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "store schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(source)
            | Self::Open { source, .. }
            | Self::Setting { source, .. }
            | Self::Migration { source, .. } => Some(source),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
