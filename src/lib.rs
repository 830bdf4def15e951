//! Convert Anki packages to and from an application-agnostic flashcard model.
//!
//! - [`apkg`]: `.apkg` archives, their media, and conversion.
//! - [`database`]: the SQLite collection inside an archive.
//! - [`package`]: the generic package model.
//! - [`widejson`]: JSON with integers wider than 53 bits.

pub use deckhand_apkg as apkg;
pub use deckhand_database as database;
pub use deckhand_package as package;
pub use deckhand_widejson as widejson;

pub use deckhand_apkg::{AnkiPackage, Issue, Outcome, Severity, archive_to_generic, generic_to_archive};
