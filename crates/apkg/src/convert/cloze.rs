//! Cloze deletions: `{{c1::answer}}` or `{{c1::answer::hint}}` inside note
//! text, each distinct group number producing one card.

use deckhand_package::{Note, NoteType};
use std::collections::BTreeSet;

use crate::consts::{CLOZE_FIELD_REGEX, CLOZE_REGEX};

/// Names of the fields cloze templates read deletions from.
pub(crate) fn cloze_fields(note_type: &NoteType) -> BTreeSet<String> {
    note_type
        .templates
        .iter()
        .flat_map(|t| [t.question.as_str(), t.answer.as_str()])
        .flat_map(|text| CLOZE_FIELD_REGEX.captures_iter(text))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

/// Zero-based card ordinals of every cloze group in `texts`.
pub fn ordinals<'a>(texts: impl IntoIterator<Item = &'a str>) -> BTreeSet<u32> {
    texts
        .into_iter()
        .flat_map(|text| CLOZE_REGEX.captures_iter(text))
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .filter_map(|group| group.checked_sub(1))
        .collect()
}

/// Card ordinals of a note of a cloze note type. Only the fields named by the
/// templates are scanned, or every field if the templates name none.
pub(crate) fn note_ordinals(note: &Note, note_type: &NoteType) -> BTreeSet<u32> {
    let fields = cloze_fields(note_type);
    let texts = note
        .fields
        .iter()
        .filter(|(name, _)| fields.is_empty() || fields.contains(name))
        .map(|(_, value)| value.as_str());
    ordinals(texts)
}
