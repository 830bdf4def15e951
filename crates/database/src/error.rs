//! Database Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A database error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
/// The first five are reported when opening an existing database, and are
/// checked in the order they're declared.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The database file has no content at all.
    #[display("database is empty")]
    Empty,
    /// Too short to even hold a SQLite header.
    #[display("database is truncated")]
    Truncated,
    /// Not a SQLite database.
    #[display("invalid database header")]
    InvalidHeader,
    /// Looks like SQLite, but can't be opened or read.
    #[display("database is corrupted")]
    Corrupted,
    /// A valid SQLite database, but not a flashcard collection.
    #[display("missing tables: {}", _0.join(", "))]
    MissingTables(#[error(not(source))] Vec<String>),
    /// The database has been closed, and can no longer be used.
    #[display("database is unavailable")]
    Unavailable,
    #[display("database error")]
    Database,
    #[display("I/O error")]
    Io,
    #[display("{_0} not found: {_1}")]
    NotFound(#[error(not(source))] &'static str, i64),
    /// Serialization/deserialization error.
    #[display("invalid collection data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
