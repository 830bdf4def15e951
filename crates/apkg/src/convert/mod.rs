//! Conversion between collection rows and the generic package model.
//!
//! Every generic entity produced from a collection records its vendor row
//! under `app_data["anki"]`, and converting back reuses those records: ids,
//! guids, scheduling state and anything else the generic model has no place
//! for. Entities without a record get ids derived from their generic ids, so
//! repeated round trips settle on the same vendor ids.

mod cloze;
mod from_generic;
pub mod ids;
mod to_generic;

pub use self::cloze::ordinals as cloze_ordinals;
pub(crate) use self::from_generic::from_generic;
pub(crate) use self::to_generic::to_generic;

/// Key of the vendor record in every entity's `app_data`.
pub const APP_DATA_KEY: &str = "anki";
/// Key of a deck's configuration group, inside the deck's vendor record.
pub const DECK_CONFIG_KEY: &str = "deckConfig";
/// Ease factor (permille) of a review with no recorded scheduling state.
pub const DEFAULT_FACTOR: i64 = 2500;
/// Wide integer ids inside one note type document.
pub(crate) const NOTE_TYPE_ID_PATHS: [&str; 3] = ["id", "flds[].id", "tmpls[].id"];
