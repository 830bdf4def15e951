//! Errors raised while reading, editing, writing or converting `.apkg`
//! packages. Database and generic-model failures are wrapped with their
//! original frame kept as a child.

use deckhand_database::error::{Error as DatabaseError, ErrorKind as DatabaseErrorKind};
use deckhand_package::error::{Error as PackageError, ErrorKind as PackageErrorKind};
use derive_more::{Display, Error};

/// An `.apkg` error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for `.apkg` operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file is not a zip archive, or its metadata can't be read.
    #[display("invalid package archive")]
    InvalidArchive,
    /// The archive holds no collection database.
    #[display("package archive contains no collection")]
    MissingCollection,
    /// The archive uses a collection format newer than this crate reads.
    #[display("unsupported package version: {_0}")]
    UnsupportedVersion(#[error(not(source))] u64),
    /// The package has been cleaned up, and can no longer be used.
    #[display("package is unavailable")]
    Unavailable,
    #[display("media file not found: {_0}")]
    MediaNotFound(#[error(not(source))] String),
    #[display("media file already exists: {_0}")]
    MediaAlreadyExists(#[error(not(source))] String),
    /// The source of a new media file could not be read.
    #[display("unreadable media source for: {_0}")]
    UnreadableSource(#[error(not(source))] String),
    /// Media names must be a single, plain file name.
    #[display("invalid media file name: {_0}")]
    InvalidMediaName(#[error(not(source))] String),
    #[display("note type not found: {_0}")]
    NoteTypeNotFound(#[error(not(source))] i64),
    #[display("deck not found: {_0}")]
    DeckNotFound(#[error(not(source))] i64),
    #[display("note not found: {_0}")]
    NoteNotFound(#[error(not(source))] i64),
    #[display("card not found: {_0}")]
    CardNotFound(#[error(not(source))] i64),
    #[display("template {ord} out of bounds for note type with {count} templates")]
    TemplateOutOfBounds { ord: i64, count: usize },
    /// Recorded application data has the wrong shape.
    #[display("invalid application data: {_0}")]
    InvalidAppData(#[error(not(source))] &'static str),
    #[display("collection database error: {_0}")]
    Database(DatabaseErrorKind),
    #[display("generic package error: {_0}")]
    Package(PackageErrorKind),
    #[display("I/O error")]
    Io,
}
impl ErrorKind {
    /// Convert a database error, preserving its `Exn` frame as a child.
    /// A closed database is reported as [`ErrorKind::Unavailable`].
    #[track_caller]
    pub fn database(err: DatabaseError) -> Error {
        let kind = match &*err {
            DatabaseErrorKind::Unavailable => ErrorKind::Unavailable,
            inner => ErrorKind::Database(inner.clone()),
        };
        err.raise(kind)
    }

    /// Convert a generic package error, preserving its `Exn` frame as a child.
    #[track_caller]
    pub fn package(err: PackageError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Package(inner))
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io | Self::UnreadableSource(_))
    }
}
