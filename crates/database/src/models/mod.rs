mod collection;
mod dump;
mod rows;

use time::UtcDateTime;

pub use self::collection::{
    Collection, DEFAULT_DECK_CONFIG_ID, DEFAULT_DECK_ID, Deck, DeckConfig, Field, NoteType, NoteTypeKind,
    SCHEMA_VERSION, Template,
};
pub(crate) use self::collection::CollectionRow;
pub use self::dump::Dump;
pub use self::rows::{Card, FIELD_SEPARATOR, Grave, GraveKind, Note, Review};

/// Milliseconds since the Unix epoch, the resolution `mod` columns and
/// review ids use.
pub fn timestamp_millis(at: UtcDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}
