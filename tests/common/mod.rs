#![allow(dead_code)]

use deckhand::package::{Card, Deck, Note, NoteType, Package, Review, Score};
use time::UtcDateTime;
use uuid::Uuid;

pub const NOTE_TYPES: usize = 6;
pub const NOTES: usize = 8;
pub const CARDS: usize = 13;
pub const REVIEWS: usize = 2;

fn cloze(name: &str) -> NoteType {
    NoteType::new(name)
        .with_field("Text")
        .with_field("Extra")
        .with_template("Cloze", "{{cloze:Text}}", "{{cloze:Text}}<br>{{Extra}}")
}

fn standard(name: &str, templates: usize) -> NoteType {
    let mut note_type = NoteType::new(name).with_field("Front").with_field("Back");
    for i in 0..templates {
        let (question, answer) = match i % 2 {
            0 => ("{{Front}}", "{{Back}}"),
            _ => ("{{Back}}", "{{Front}}"),
        };
        note_type = note_type.with_template(format!("Card {}", i + 1), question, answer);
    }
    note_type
}

fn add_note(package: &mut Package, note_type: &NoteType, deck: Uuid, values: &[&str], tags: &[&str]) -> Uuid {
    let mut note = Note::new(note_type.id, deck);
    for (field, value) in note_type.fields.iter().zip(values) {
        note = note.with_field(&field.name, *value);
    }
    for tag in tags {
        note = note.with_tag(*tag);
    }
    package.add_note(note).unwrap()
}

/// Two cloze note types and four standard ones: eight notes, thirteen cards
/// (seven from cloze deletions, six from templates) and two reviews.
pub fn fixture() -> Package {
    let mut package = Package::new();
    let languages = package.add_deck(Deck::new("Languages").with_description("Vocabulary")).unwrap();
    let french = package.add_deck(Deck::new("Languages::French")).unwrap();

    let cloze_a = cloze("Cloze");
    let cloze_b = cloze("Cloze (typed)");
    let basic = standard("Basic", 1);
    let reversed = standard("Basic (and reversed card)", 2);
    let basic3 = standard("Basic 3", 1);
    let basic4 = standard("Basic 4", 1);
    for note_type in [&cloze_a, &cloze_b, &basic, &reversed, &basic3, &basic4] {
        package.add_note_type(note_type.clone()).unwrap();
    }

    add_note(&mut package, &cloze_a, languages, &["{{c1::Paris}} is in {{c2::France}}, {{c3::Europe}}", ""], &["geo"]);
    add_note(&mut package, &cloze_a, french, &["{{c1::chat}} means {{c2::cat::animal}}", "noun"], &[]);
    add_note(&mut package, &cloze_b, french, &["{{c2::le}} before {{c1::la}}", ""], &["grammar"]);

    let standard_notes = [
        (&basic, languages, ["hello", "bonjour"], &["greeting", "basic"][..]),
        (&basic, french, ["<b>bread</b>", "pain <img src=\"bread.png\">"], &[][..]),
        (&reversed, french, ["water", "eau"], &["drink"][..]),
        (&basic3, languages, ["one", "un"], &[][..]),
        (&basic4, languages, ["two", "deux"], &[][..]),
    ];
    let mut first_card = None;
    for (note_type, deck, values, tags) in standard_notes {
        let note = add_note(&mut package, note_type, deck, &values, tags);
        for template in 0..note_type.templates.len() as u32 {
            let card = package.add_card(Card::new(note, template)).unwrap();
            first_card.get_or_insert(card);
        }
    }

    let card = first_card.unwrap();
    let at = UtcDateTime::from_unix_timestamp(1_700_000_000).unwrap();
    package.add_review(Review::new(card, Score::Hard, at)).unwrap();
    package.add_review(Review::new(card, Score::Easy, at + time::Duration::days(3))).unwrap();
    package
}

/// Every note as `(note type name, deck name, fields, tags)`, sorted.
pub fn note_contents(package: &Package) -> Vec<(String, String, Vec<(String, String)>, Vec<String>)> {
    let mut contents = package
        .notes()
        .map(|note| {
            let note_type = package.note_type(note.note_type_id).unwrap().name.clone();
            let deck = package.deck(note.deck_id).unwrap().name.clone();
            (note_type, deck, note.fields.clone(), note.tags.clone())
        })
        .collect::<Vec<_>>();
    contents.sort();
    contents
}
