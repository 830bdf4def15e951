//! JSON codec for documents carrying integers wider than 53 bits.
//!
//! Flashcard collections store their note-type registry as JSON, and the ids
//! of note types, fields and templates inside it are random 64-bit values.
//! Plenty of producers read that JSON as doubles and silently lose digits.
//! This crate keeps every digit: [`WideInt`] serializes as a bare number, and
//! [`WideJson`] parses documents so that the values at a declared set of
//! [`FieldPath`]s arrive as exact integers while everything else keeps
//! ordinary JSON semantics.
//!
//! ```
//! use deckhand_widejson::WideJson;
//!
//! let codec = WideJson::new(["flds[].id"]).unwrap();
//! let text = r#"{"flds": [{"id": 170141183460469231731687303715884105727}]}"#;
//! let doc: serde_json::Value = codec.parse(text).unwrap();
//! assert_eq!(doc["flds"][0]["id"], "170141183460469231731687303715884105727");
//! ```

mod codec;
pub mod error;
mod path;
mod wide;

pub use crate::codec::{WideJson, parse, to_string};
pub use crate::path::{FieldPath, Segment};
pub use crate::wide::WideInt;
