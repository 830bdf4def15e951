//! SQLite storage for one flashcard collection.
//!
//! A collection is a single SQLite file: a singleton `col` row holding global
//! configuration and the deck, deck-config and note-type registries as JSON,
//! plus `notes`, `cards`, `revlog` and `graves` tables. [`Database`] owns a
//! private copy of that file for as long as it's open, and can hand back its
//! bytes (or an in-memory [`Dump`] of every row) at any time.
//!
//! Note-type ids are random 64-bit values stored in JSON, so the `models`
//! document is read through [`deckhand_widejson`] to keep every digit.

mod db;
pub mod error;
mod models;
mod outcome;
mod repo;

pub use crate::db::{Database, REQUIRED_TABLES};
pub use crate::models::*;
pub use crate::outcome::{Issue, Outcome, Severity};
