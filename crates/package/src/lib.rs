//! Application-agnostic flashcard package model.
//!
//! Decks, note types, notes, cards and reviews, keyed by random time-ordered
//! identifiers (UUIDv7). Format-specific importers and exporters convert to
//! and from this model and record whatever they need for a faithful round
//! trip in each entity's `app_data`.

pub mod error;
mod models;
mod package;

pub use crate::models::{AppData, Card, Deck, Field, Note, NoteType, Review, Score, Template};
pub use crate::package::Package;
