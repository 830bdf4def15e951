//! Package Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use uuid::Uuid;

/// A package error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for package operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Referential-integrity violations. Every one of them is a caller bug: the
/// referenced entity has to be added first.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("deck not found: {_0}")]
    DeckNotFound(#[error(not(source))] Uuid),
    #[display("note type not found: {_0}")]
    NoteTypeNotFound(#[error(not(source))] Uuid),
    #[display("note not found: {_0}")]
    NoteNotFound(#[error(not(source))] Uuid),
    #[display("card not found: {_0}")]
    CardNotFound(#[error(not(source))] Uuid),
    #[display("template {template} out of bounds for note type with {count} templates")]
    TemplateOutOfBounds { template: u32, count: usize },
    #[display("entity already exists: {_0}")]
    Duplicate(#[error(not(source))] Uuid),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
