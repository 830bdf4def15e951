//! Anki `.apkg` packages.
//!
//! An `.apkg` file is a ZIP archive holding a SQLite collection, a `media`
//! manifest mapping numbered entries to file names, and the media files
//! themselves. [`AnkiPackage`] stages all of that in temporary storage so it
//! can be inspected, edited, and written back out, and converts it to and from
//! the generic [`deckhand_package::Package`] model.
//!
//! For one-shot conversions use [`archive_to_generic`] and
//! [`generic_to_archive`].

mod archive;
mod consts;
pub mod convert;
pub mod error;
mod media;
mod package;
mod pipeline;

pub use crate::archive::SchemaVersion;
pub use crate::convert::{APP_DATA_KEY, cloze_ordinals};
pub use crate::media::{MediaSource, references as media_references};
pub use crate::package::AnkiPackage;
pub use crate::pipeline::{archive_to_generic, generic_to_archive};
pub use deckhand_database::{Issue, Severity};

pub type Outcome<T> = deckhand_database::Outcome<T, error::Error>;
