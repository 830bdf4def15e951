//! Codec Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A codec error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A value reachable by a declared wide-integer path is not a number.
    #[display("field '{field}' at path '{path}' is not numeric, found value: {value}")]
    NonNumericField {
        /// Name of the offending field.
        field: String,
        /// The declared path the field was reached through.
        path: String,
        /// The offending value, as JSON text.
        value: String,
    },
    /// A field path could not be parsed, or does not end in a field name.
    #[display("invalid field path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// An integer doesn't fit into the fixed-width column it's written to.
    #[display("integer out of range: {_0}")]
    OutOfRange(#[error(not(source))] String),
    /// The input is not valid JSON.
    #[display("malformed JSON")]
    Syntax,
    /// The JSON is valid, but doesn't fit the requested type.
    #[display("JSON does not match the expected structure")]
    Deserialize,
    /// The value could not be serialized.
    #[display("value could not be serialized to JSON")]
    Serialize,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // JSON text is either valid or it isn't.
        false
    }
}
