//! Collection rows to generic package.

use deckhand_database::{self as db, DEFAULT_DECK_ID, Dump};
use deckhand_package::{self as pkg, Score};
use deckhand_widejson::WideJson;
use exn::ResultExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use time::UtcDateTime;
use uuid::Uuid;

use crate::convert::{APP_DATA_KEY, DECK_CONFIG_KEY, NOTE_TYPE_ID_PATHS};
use crate::error::{ErrorKind, Result};

fn record(value: &impl Serialize) -> Result<pkg::AppData> {
    let value = serde_json::to_value(value).or_raise(|| ErrorKind::InvalidAppData("record"))?;
    Ok(pkg::AppData::from_iter([(APP_DATA_KEY.to_string(), value)]))
}

/// Note types hold wide ids, which can't go through `serde_json::Value` as
/// numbers; they're recorded as strings of digits instead.
fn record_note_type(note_type: &db::NoteType) -> Result<pkg::AppData> {
    let text = deckhand_widejson::to_string(note_type).or_raise(|| ErrorKind::InvalidAppData("note type"))?;
    let value = WideJson::new(NOTE_TYPE_ID_PATHS)
        .and_then(|codec| codec.parse_value(&text))
        .or_raise(|| ErrorKind::InvalidAppData("note type"))?;
    Ok(pkg::AppData::from_iter([(APP_DATA_KEY.to_string(), value)]))
}

fn score(ease: i64) -> Option<Score> {
    match ease {
        1 => Some(Score::Again),
        2 => Some(Score::Hard),
        3 => Some(Score::Normal),
        4 => Some(Score::Easy),
        _ => None,
    }
}

struct Converter<'a> {
    dump: &'a Dump,
    package: pkg::Package,
    decks: HashMap<i64, Uuid>,
    note_types: HashMap<i64, Uuid>,
    notes: HashMap<i64, Uuid>,
    cards: HashMap<i64, Uuid>,
}
impl<'a> Converter<'a> {
    fn new(dump: &'a Dump) -> Self {
        Self {
            dump,
            package: pkg::Package::new(),
            decks: HashMap::new(),
            note_types: HashMap::new(),
            notes: HashMap::new(),
            cards: HashMap::new(),
        }
    }

    /// The vendor deck each note ends up in: the deck of its card with the
    /// lowest ordinal, or the default deck for notes without cards (or whose
    /// card points at a deck that doesn't exist).
    fn note_decks(&self) -> HashMap<i64, i64> {
        let mut lowest: HashMap<i64, (i64, i64)> = HashMap::new();
        for card in &self.dump.cards {
            let entry = lowest.entry(card.nid).or_insert((card.ord, card.did));
            if card.ord < entry.0 {
                *entry = (card.ord, card.did);
            }
        }
        self.dump
            .notes
            .iter()
            .filter(|note| self.dump.collection.models.contains_key(&note.mid))
            .map(|note| {
                let did = lowest.get(&note.id).map(|(_, did)| *did).unwrap_or(DEFAULT_DECK_ID);
                match self.dump.collection.decks.contains_key(&did) {
                    true => (note.id, did),
                    false => (note.id, DEFAULT_DECK_ID),
                }
            })
            .collect()
    }

    fn decks(&mut self, used: &HashMap<i64, i64>) -> Result<()> {
        let dump = self.dump;
        let default_used = used.values().any(|did| *did == DEFAULT_DECK_ID);
        for (id, deck) in &dump.collection.decks {
            if *id == DEFAULT_DECK_ID && !default_used {
                continue;
            }
            self.deck(deck)?;
        }
        if default_used && !self.decks.contains_key(&DEFAULT_DECK_ID) {
            self.deck(&db::Deck::new(DEFAULT_DECK_ID, "Default"))?;
        }
        Ok(())
    }

    fn deck(&mut self, deck: &db::Deck) -> Result<()> {
        let mut generic = pkg::Deck::new(&deck.name).with_description(&deck.desc);
        generic.app_data = record(deck)?;
        let dump = self.dump;
        let config = deck.conf.and_then(|id| dump.collection.dconf.get(&id));
        if let (Some(config), Some(Value::Object(anki))) = (config, generic.app_data.get_mut(APP_DATA_KEY)) {
            let config = serde_json::to_value(config).or_raise(|| ErrorKind::InvalidAppData("deck config"))?;
            anki.insert(DECK_CONFIG_KEY.to_string(), config);
        }
        let uuid = self.package.add_deck(generic).map_err(ErrorKind::package)?;
        self.decks.insert(deck.id, uuid);
        Ok(())
    }

    fn note_types(&mut self) -> Result<()> {
        let dump = self.dump;
        for (mid, note_type) in &dump.collection.models {
            let mut fields = note_type.flds.iter().collect::<Vec<_>>();
            fields.sort_by_key(|f| f.ord);
            let mut templates = note_type.tmpls.iter().collect::<Vec<_>>();
            templates.sort_by_key(|t| t.ord);
            let mut generic = pkg::NoteType::new(&note_type.name);
            for field in fields {
                generic = generic.with_field(&field.name);
            }
            for template in templates {
                generic = generic.with_template(&template.name, &template.qfmt, &template.afmt);
            }
            generic.app_data = record_note_type(note_type)?;
            let uuid = self.package.add_note_type(generic).map_err(ErrorKind::package)?;
            self.note_types.insert(*mid, uuid);
        }
        Ok(())
    }

    fn notes(&mut self, note_decks: &HashMap<i64, i64>) -> Result<()> {
        let dump = self.dump;
        for note in &dump.notes {
            let (Some(note_type), Some(model)) =
                (self.note_types.get(&note.mid).copied(), dump.collection.models.get(&note.mid))
            else {
                tracing::warn!(note = note.id, mid = note.mid, "Skipping note of unknown note type");
                continue;
            };
            let did = note_decks.get(&note.id).copied().unwrap_or(DEFAULT_DECK_ID);
            let Some(deck) = self.decks.get(&did).copied() else {
                tracing::warn!(note = note.id, deck = did, "Skipping note in unknown deck");
                continue;
            };
            let mut names = model.flds.iter().collect::<Vec<_>>();
            names.sort_by_key(|f| f.ord);
            let values = note.fields();
            if values.len() != names.len() {
                tracing::warn!(
                    note = note.id,
                    fields = names.len(),
                    values = values.len(),
                    "Note field count doesn't match its note type"
                );
            }
            let mut generic = pkg::Note::new(note_type, deck);
            for (i, field) in names.iter().enumerate() {
                generic = generic.with_field(&field.name, values.get(i).copied().unwrap_or_default());
            }
            for tag in note.tag_list() {
                generic = generic.with_tag(tag);
            }
            generic.app_data = record(note)?;
            let uuid = self.package.add_note(generic).map_err(ErrorKind::package)?;
            self.notes.insert(note.id, uuid);
        }
        Ok(())
    }

    fn cards(&mut self) -> Result<()> {
        let dump = self.dump;
        for card in &dump.cards {
            let Some(note) = self.notes.get(&card.nid).copied() else {
                tracing::warn!(card = card.id, note = card.nid, "Skipping card of unknown note");
                continue;
            };
            let Ok(ord) = u32::try_from(card.ord) else {
                tracing::warn!(card = card.id, ord = card.ord, "Skipping card with invalid ordinal");
                continue;
            };
            let mut generic = pkg::Card::new(note, ord);
            generic.app_data = record(card)?;
            match self.package.add_card(generic) {
                Ok(uuid) => {
                    self.cards.insert(card.id, uuid);
                },
                Err(err) => tracing::warn!(card = card.id, error = %err, "Skipping card"),
            }
        }
        Ok(())
    }

    fn reviews(&mut self) -> Result<()> {
        let dump = self.dump;
        for review in &dump.reviews {
            let Some(score) = score(review.ease) else {
                // Manual rescheduling, not a review.
                tracing::warn!(review = review.id, ease = review.ease, "Skipping review with unknown ease");
                continue;
            };
            let Some(card) = self.cards.get(&review.cid).copied() else {
                tracing::warn!(review = review.id, card = review.cid, "Skipping review of unknown card");
                continue;
            };
            let Ok(reviewed_at) = UtcDateTime::from_unix_timestamp_nanos(review.id as i128 * 1_000_000) else {
                tracing::warn!(review = review.id, "Skipping review with an out of range timestamp");
                continue;
            };
            let mut generic = pkg::Review::new(card, score, reviewed_at);
            generic.app_data = record(review)?;
            self.package.add_review(generic).map_err(ErrorKind::package)?;
        }
        Ok(())
    }
}

/// Convert every row of a collection into a generic package, recording the
/// vendor rows in each entity's application data.
///
/// Rows that can't be placed (notes of unknown note types, cards of unknown
/// notes, manual reschedules in the review log) are skipped with a warning.
pub(crate) fn to_generic(dump: &Dump) -> Result<pkg::Package> {
    let mut converter = Converter::new(dump);
    let note_decks = converter.note_decks();
    converter.decks(&note_decks)?;
    converter.note_types()?;
    converter.notes(&note_decks)?;
    converter.cards()?;
    converter.reviews()?;
    tracing::debug!(
        decks = converter.decks.len(),
        notes = converter.notes.len(),
        cards = converter.cards.len(),
        "Converted collection to generic package"
    );
    Ok(converter.package)
}
