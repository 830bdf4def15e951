//! Generic package to collection rows.

use deckhand_database::{
    self as db, DEFAULT_DECK_CONFIG_ID, DEFAULT_DECK_ID, Dump, Field, NoteTypeKind, Template, timestamp_millis,
};
use deckhand_package::{self as pkg, Score};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use time::UtcDateTime;
use uuid::Uuid;

use crate::convert::cloze::note_ordinals;
use crate::convert::ids::{Guids, checksum, derive_id, strip_html};
use crate::convert::{APP_DATA_KEY, DECK_CONFIG_KEY, DEFAULT_FACTOR};
use crate::error::{ErrorKind, Result};

/// Vendor data recorded in an entity's application data, if any.
#[derive(Clone, Copy)]
struct Recorded<'a>(Option<&'a Map<String, Value>>);
impl<'a> Recorded<'a> {
    fn of(app_data: &'a pkg::AppData) -> Self {
        Self(app_data.get(APP_DATA_KEY).and_then(Value::as_object))
    }

    fn int(&self, key: &str) -> Option<i64> {
        self.0?.get(key)?.as_i64()
    }

    fn text(&self, key: &str) -> Option<&'a str> {
        self.0?.get(key)?.as_str()
    }

    /// The whole record as `T`, leaving out `exclude`. Unreadable records are
    /// logged and ignored.
    fn parse<T: DeserializeOwned>(&self, exclude: &[&str]) -> Option<T> {
        let mut object = self.0?.clone();
        for key in exclude {
            object.remove(*key);
        }
        match serde_json::from_value(Value::Object(object)) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                tracing::warn!(error = %err, "Ignoring unreadable recorded data");
                None
            },
        }
    }

    fn nested<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.0?.get(key)?;
        serde_json::from_value(value.clone()).ok()
    }
}

fn ease(score: Score) -> i64 {
    match score {
        Score::Again => 1,
        Score::Hard => 2,
        Score::Normal => 3,
        Score::Easy => 4,
    }
}

struct Converter<'a> {
    package: &'a pkg::Package,
    dump: Dump,
    now: UtcDateTime,
    decks: HashMap<Uuid, i64>,
    note_types: HashMap<Uuid, i64>,
    note_ids: HashSet<i64>,
    cards: HashMap<Uuid, i64>,
    card_ids: HashSet<i64>,
    emitted: HashSet<(i64, u32)>,
    review_ids: HashSet<i64>,
    guids: Guids,
    // Due position of the next new card.
    position: i64,
}
impl<'a> Converter<'a> {
    fn new(package: &'a pkg::Package) -> Self {
        Self {
            package,
            dump: Dump::default(),
            now: UtcDateTime::now(),
            decks: HashMap::new(),
            note_types: HashMap::new(),
            note_ids: HashSet::new(),
            cards: HashMap::new(),
            card_ids: HashSet::new(),
            emitted: HashSet::new(),
            review_ids: HashSet::new(),
            guids: Guids::default(),
            position: 0,
        }
    }

    fn decks(&mut self) {
        let package = self.package;
        let collection = &mut self.dump.collection;
        for deck in package.decks() {
            let recorded = Recorded::of(&deck.app_data);
            let mut vendor = recorded
                .parse::<db::Deck>(&[DECK_CONFIG_KEY])
                .unwrap_or_else(|| db::Deck::new(derive_id(deck.id.to_string()), &deck.name));
            vendor.name = deck.name.clone();
            vendor.desc = deck.description.clone();
            if let Some(config) = recorded.nested::<db::DeckConfig>(DECK_CONFIG_KEY) {
                collection.dconf.insert(config.id, config);
            }
            self.decks.insert(deck.id, vendor.id);
            collection.decks.insert(vendor.id, vendor);
        }
        for deck in collection.decks.values_mut() {
            if deck.conf.is_some_and(|id| !collection.dconf.contains_key(&id)) {
                deck.conf = Some(DEFAULT_DECK_CONFIG_ID);
            }
        }
    }

    fn note_types(&mut self) -> Result<()> {
        let package = self.package;
        for note_type in package.note_types() {
            let base = Recorded::of(&note_type.app_data).parse::<db::NoteType>(&[]);
            let kind = match note_type.is_cloze() {
                true => NoteTypeKind::Cloze,
                false => NoteTypeKind::Standard,
            };
            let mut vendor = base
                .clone()
                .unwrap_or_else(|| db::NoteType::new(derive_id(note_type.id.to_string()), &note_type.name, kind));
            vendor.name = note_type.name.clone();
            vendor.kind = kind;
            vendor.flds = note_type
                .fields
                .iter()
                .enumerate()
                .map(|(ord, field)| {
                    let ord = ord as u32;
                    let mut vendor = base
                        .as_ref()
                        .and_then(|b| b.flds.iter().find(|f| f.ord == ord))
                        .cloned()
                        .unwrap_or_else(|| Field::new(&field.name, ord));
                    vendor.name = field.name.clone();
                    vendor.ord = ord;
                    vendor.id.get_or_insert_with(|| derive_id(format!("{}/field/{ord}", note_type.id)).into());
                    vendor
                })
                .collect();
            vendor.tmpls = note_type
                .templates
                .iter()
                .enumerate()
                .map(|(ord, template)| {
                    let ord = ord as u32;
                    let mut vendor = base
                        .as_ref()
                        .and_then(|b| b.tmpls.iter().find(|t| t.ord == ord))
                        .cloned()
                        .unwrap_or_else(|| Template::new(&template.name, ord, "", ""));
                    vendor.name = template.name.clone();
                    vendor.ord = ord;
                    vendor.qfmt = template.question.clone();
                    vendor.afmt = template.answer.clone();
                    vendor.id.get_or_insert_with(|| derive_id(format!("{}/template/{ord}", note_type.id)).into());
                    vendor
                })
                .collect();
            if vendor.sortf as usize >= vendor.flds.len() {
                vendor.sortf = 0;
            }
            let mid = vendor.mid().map_err(ErrorKind::database)?;
            if self.dump.collection.models.contains_key(&mid) {
                tracing::warn!(note_type = %note_type.id, mid, "Skipping note type with a duplicate id");
                continue;
            }
            self.note_types.insert(note_type.id, mid);
            self.dump.collection.models.insert(mid, vendor);
        }
        Ok(())
    }

    fn notes(&mut self) {
        let package = self.package;
        for note in package.notes() {
            let (Some(mid), Some(note_type)) =
                (self.note_types.get(&note.note_type_id).copied(), package.note_type(note.note_type_id))
            else {
                tracing::warn!(note = %note.id, "Skipping note of a skipped note type");
                continue;
            };
            let recorded = Recorded::of(&note.app_data);
            let id = recorded
                .int("id")
                .filter(|id| !self.note_ids.contains(id))
                .unwrap_or_else(|| derive_id(note.id.to_string()));
            if !self.note_ids.insert(id) {
                tracing::warn!(note = %note.id, id, "Skipping note with a duplicate id");
                continue;
            }
            let values = note_type
                .fields
                .iter()
                .map(|field| note.field(&field.name).unwrap_or_default())
                .collect::<Vec<_>>();
            let first = values.first().copied().unwrap_or_default();
            let guid = match recorded.text("guid") {
                Some(guid) if self.guids.claim(guid) => guid.to_string(),
                _ => self.guids.fresh(),
            };
            let did = self.decks.get(&note.deck_id).copied().unwrap_or(DEFAULT_DECK_ID);
            self.dump.notes.push(db::Note {
                id,
                guid,
                mid,
                modified: recorded.int("mod").unwrap_or(self.now.unix_timestamp()),
                usn: recorded.int("usn").unwrap_or(-1),
                tags: db::Note::join_tags(&note.tags),
                flds: db::Note::join_fields(&values),
                sfld: strip_html(first),
                csum: checksum(first),
                flags: recorded.int("flags").unwrap_or(0),
                data: recorded.text("data").unwrap_or_default().to_string(),
            });
            self.cards(note, note_type, id, did);
        }
    }

    /// Vendor cards of one note. Standard notes get exactly the cards they
    /// have; cloze notes get one card per deletion group in their text.
    fn cards(&mut self, note: &pkg::Note, note_type: &pkg::NoteType, nid: i64, did: i64) {
        let package = self.package;
        let existing = package.cards_for_note(note.id).collect::<Vec<_>>();
        let wanted: Vec<(u32, Option<&pkg::Card>)> = match note_type.is_cloze() {
            true => {
                let ordinals = note_ordinals(note, note_type);
                if ordinals.is_empty() {
                    tracing::warn!(note = %note.id, "Cloze note has no deletions");
                }
                let mut by_ord = BTreeMap::new();
                for card in &existing {
                    by_ord.entry(card.template).or_insert(*card);
                }
                let dropped = by_ord.keys().filter(|ord| !ordinals.contains(ord)).collect::<BTreeSet<_>>();
                if !dropped.is_empty() {
                    tracing::warn!(note = %note.id, ?dropped, "Dropping cloze cards without a matching deletion");
                }
                ordinals.into_iter().map(|ord| (ord, by_ord.get(&ord).copied())).collect()
            },
            false => existing.iter().map(|card| (card.template, Some(*card))).collect(),
        };
        for (ord, card) in wanted {
            if !self.emitted.insert((nid, ord)) {
                continue;
            }
            let recorded = card.map(|c| Recorded::of(&c.app_data)).unwrap_or(Recorded(None));
            let mut id = recorded.int("id").filter(|id| !self.card_ids.contains(id)).unwrap_or_else(|| match card {
                Some(card) => derive_id(card.id.to_string()),
                None => derive_id(format!("{}/{ord}", note.id)),
            });
            while !self.card_ids.insert(id) {
                tracing::warn!(note = %note.id, ord, id, "Card id already taken, deriving another");
                id = derive_id(format!("{}/{ord}/{id}", note.id));
            }
            let did = recorded.int("did").filter(|did| self.dump.collection.decks.contains_key(did)).unwrap_or(did);
            self.position += 1;
            self.dump.cards.push(db::Card {
                id,
                nid,
                did,
                ord: ord as i64,
                modified: recorded.int("mod").unwrap_or(self.now.unix_timestamp()),
                usn: recorded.int("usn").unwrap_or(-1),
                card_type: recorded.int("type").unwrap_or(0),
                queue: recorded.int("queue").unwrap_or(0),
                due: recorded.int("due").unwrap_or(self.position),
                ivl: recorded.int("ivl").unwrap_or(0),
                factor: recorded.int("factor").unwrap_or(0),
                reps: recorded.int("reps").unwrap_or(0),
                lapses: recorded.int("lapses").unwrap_or(0),
                left: recorded.int("left").unwrap_or(0),
                odue: recorded.int("odue").unwrap_or(0),
                odid: recorded.int("odid").unwrap_or(0),
                flags: recorded.int("flags").unwrap_or(0),
                data: recorded.text("data").unwrap_or_default().to_string(),
            });
            if let Some(card) = card {
                self.cards.insert(card.id, id);
            }
        }
    }

    /// Review ids are review times in milliseconds, nudged forward until
    /// they're unique.
    fn reviews(&mut self) {
        let package = self.package;
        for review in package.reviews() {
            let Some(cid) = self.cards.get(&review.card_id).copied() else {
                tracing::warn!(review = %review.id, card = %review.card_id, "Skipping review of a dropped card");
                continue;
            };
            let mut id = timestamp_millis(review.reviewed_at);
            while !self.review_ids.insert(id) {
                id += 1;
            }
            let recorded = Recorded::of(&review.app_data);
            self.dump.reviews.push(db::Review {
                id,
                cid,
                usn: recorded.int("usn").unwrap_or(-1),
                ease: ease(review.score),
                ivl: recorded.int("ivl").unwrap_or(0),
                last_ivl: recorded.int("lastIvl").unwrap_or(0),
                factor: recorded.int("factor").unwrap_or(DEFAULT_FACTOR),
                time: recorded.int("time").unwrap_or(0),
                review_type: recorded.int("type").unwrap_or(0),
            });
        }
    }
}

/// Convert a generic package into collection rows.
///
/// Vendor ids recorded in application data are reused; everything else gets
/// an id derived from its generic id, so converting the same package twice
/// yields the same ids.
pub(crate) fn from_generic(package: &pkg::Package) -> Result<Dump> {
    let mut converter = Converter::new(package);
    converter.decks();
    converter.note_types()?;
    converter.notes();
    converter.reviews();
    let mut dump = converter.dump;
    dump.collection.modified = timestamp_millis(converter.now);
    dump.reviews.sort_by_key(|r| r.id);
    tracing::debug!(
        notes = dump.notes.len(),
        cards = dump.cards.len(),
        reviews = dump.reviews.len(),
        "Converted generic package to collection"
    );
    Ok(dump)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cloze() -> pkg::NoteType {
        pkg::NoteType::new("Cloze")
            .with_field("Text")
            .with_field("Back Extra")
            .with_template("Cloze", "{{cloze:Text}}", "{{cloze:Text}}<br>{{Back Extra}}")
    }

    fn basic() -> pkg::NoteType {
        pkg::NoteType::new("Basic").with_field("Front").with_field("Back").with_template("Card 1", "{{Front}}", "{{Back}}")
    }

    #[test]
    fn test_cloze_expansion_ignores_marker_order() {
        let mut package = pkg::Package::new();
        let deck = package.add_deck(pkg::Deck::new("Deck")).unwrap();
        let note_type = package.add_note_type(cloze()).unwrap();
        let note = pkg::Note::new(note_type, deck).with_field("Text", "{{c2::second}} before {{c1::first}}");
        package.add_note(note).unwrap();
        let dump = from_generic(&package).unwrap();
        let ords = dump.cards.iter().map(|c| c.ord).collect::<BTreeSet<_>>();
        assert_eq!(ords, BTreeSet::from([0, 1]));
        assert_eq!(dump.collection.models.values().next().unwrap().kind, NoteTypeKind::Cloze);
    }

    #[test]
    fn test_cloze_cards_keep_generic_identity() {
        let mut package = pkg::Package::new();
        let deck = package.add_deck(pkg::Deck::new("Deck")).unwrap();
        let note_type = package.add_note_type(cloze()).unwrap();
        let note = pkg::Note::new(note_type, deck).with_field("Text", "{{c1::one}} {{c2::two}}");
        let note_id = package.add_note(note).unwrap();
        let card = pkg::Card::new(note_id, 1);
        let card_id = package.add_card(card).unwrap();
        // Ordinal 5 has no deletion in the text.
        package.add_card(pkg::Card::new(note_id, 5)).unwrap();

        let dump = from_generic(&package).unwrap();
        assert_eq!(dump.cards.len(), 2);
        let second = dump.cards.iter().find(|c| c.ord == 1).unwrap();
        assert_eq!(second.id, derive_id(card_id.to_string()));
        let first = dump.cards.iter().find(|c| c.ord == 0).unwrap();
        assert_eq!(first.id, derive_id(format!("{note_id}/0")));
    }

    #[test]
    fn test_note_columns() {
        let mut package = pkg::Package::new();
        let deck = package.add_deck(pkg::Deck::new("Deck")).unwrap();
        let note_type = package.add_note_type(basic()).unwrap();
        let note = pkg::Note::new(note_type, deck)
            .with_field("Back", "answer")
            .with_field("Front", "<b>hello</b>")
            .with_tag("greeting");
        let note_id = package.add_note(note).unwrap();
        package.add_card(pkg::Card::new(note_id, 0)).unwrap();

        let dump = from_generic(&package).unwrap();
        let note = &dump.notes[0];
        assert_eq!(note.fields(), vec!["<b>hello</b>", "answer"]);
        assert_eq!(note.sfld, "hello");
        assert_eq!(note.csum, checksum("hello"));
        assert_eq!(note.tags, " greeting ");
        assert_eq!(note.id, derive_id(note_id.to_string()));
        assert_ne!(dump.cards[0].did, DEFAULT_DECK_ID);
        let model = &dump.collection.models[&note.mid];
        assert!(model.flds.iter().all(|f| f.id.is_some()));
        assert!(model.tmpls.iter().all(|t| t.id.is_some()));
    }

    #[test]
    fn test_recorded_values_win() {
        let mut package = pkg::Package::new();
        let mut deck = pkg::Deck::new("Deck");
        deck.app_data.insert(APP_DATA_KEY.to_string(), json!({"id": 1234, "name": "Old name", "conf": 77}));
        let deck = package.add_deck(deck).unwrap();
        let note_type = package.add_note_type(basic()).unwrap();
        let mut note = pkg::Note::new(note_type, deck).with_field("Front", "f");
        note.app_data.insert(APP_DATA_KEY.to_string(), json!({"id": 555, "guid": "keep-me", "data": "plugin"}));
        let note_id = package.add_note(note).unwrap();
        let card_id = package.add_card(pkg::Card::new(note_id, 0)).unwrap();
        let mut review = pkg::Review::new(card_id, Score::Hard, UtcDateTime::from_unix_timestamp(1_600_000_000).unwrap());
        review.app_data.insert(APP_DATA_KEY.to_string(), json!({"ivl": 3, "time": 1500}));
        package.add_review(review).unwrap();

        let dump = from_generic(&package).unwrap();
        let deck = &dump.collection.decks[&1234];
        assert_eq!(deck.name, "Deck");
        // The recorded deck config isn't there, so the default is used.
        assert_eq!(deck.conf, Some(DEFAULT_DECK_CONFIG_ID));
        assert_eq!(dump.notes[0].id, 555);
        assert_eq!(dump.notes[0].guid, "keep-me");
        assert_eq!(dump.notes[0].data, "plugin");
        assert_eq!(dump.cards[0].did, 1234);
        let review = &dump.reviews[0];
        assert_eq!(review.id, 1_600_000_000_000);
        assert_eq!((review.ease, review.ivl, review.time), (2, 3, 1500));
        assert_eq!((review.last_ivl, review.factor, review.review_type), (0, DEFAULT_FACTOR, 0));
    }

    #[test]
    fn test_repeated_recorded_ids_are_replaced() {
        let mut package = pkg::Package::new();
        let deck = package.add_deck(pkg::Deck::new("Deck")).unwrap();
        let note_type = package.add_note_type(basic()).unwrap();
        let mut card_ids = Vec::new();
        for front in ["one", "two"] {
            let mut note = pkg::Note::new(note_type, deck).with_field("Front", front);
            note.app_data.insert(APP_DATA_KEY.to_string(), json!({"id": 555}));
            let note_id = package.add_note(note).unwrap();
            let mut card = pkg::Card::new(note_id, 0);
            card.app_data.insert(APP_DATA_KEY.to_string(), json!({"id": 777}));
            card_ids.push(package.add_card(card).unwrap());
        }

        let dump = from_generic(&package).unwrap();
        let ids = dump.cards.iter().map(|c| c.id).collect::<BTreeSet<_>>();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&777));
        assert!(card_ids.iter().any(|id| ids.contains(&derive_id(id.to_string()))));
        let notes = dump.notes.iter().map(|n| n.id).collect::<BTreeSet<_>>();
        assert_eq!(notes.len(), 2);
        assert!(dump.cards.iter().all(|c| notes.contains(&c.nid)));
    }

    #[test]
    fn test_review_ids_are_unique() {
        let mut package = pkg::Package::new();
        let deck = package.add_deck(pkg::Deck::new("Deck")).unwrap();
        let note_type = package.add_note_type(basic()).unwrap();
        let note_id = package.add_note(pkg::Note::new(note_type, deck)).unwrap();
        let card_id = package.add_card(pkg::Card::new(note_id, 0)).unwrap();
        let at = UtcDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        for score in [Score::Again, Score::Easy] {
            package.add_review(pkg::Review::new(card_id, score, at)).unwrap();
        }
        let dump = from_generic(&package).unwrap();
        let ids = dump.reviews.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![1_700_000_000_000, 1_700_000_000_001]);
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let mut package = pkg::Package::new();
        let deck = package.add_deck(pkg::Deck::new("Deck")).unwrap();
        let note_type = package.add_note_type(cloze()).unwrap();
        let note = pkg::Note::new(note_type, deck).with_field("Text", "{{c1::a}} {{c3::c}}");
        package.add_note(note).unwrap();
        let first = from_generic(&package).unwrap();
        let second = from_generic(&package).unwrap();
        let ids = |dump: &Dump| dump.cards.iter().map(|c| c.id).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.collection.models.keys().collect::<Vec<_>>(), second.collection.models.keys().collect::<Vec<_>>());
        assert!(first.collection.decks.keys().all(|id| *id == DEFAULT_DECK_ID || second.collection.decks.contains_key(id)));
    }
}
