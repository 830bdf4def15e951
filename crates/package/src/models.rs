use serde_json::{Map, Value};
use time::UtcDateTime;
use uuid::Uuid;

/// Free-form, application-specific metadata.
///
/// Importers record whatever they need to map entities back to their source
/// format here, namespaced under their own key.
pub type AppData = Map<String, Value>;

/// A named collection of notes.
#[derive(Debug, Clone, PartialEq)]
pub struct Deck {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub app_data: AppData,
}
impl Deck {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: String::new(),
            app_data: AppData::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
}

/// A card template: question and answer markup referencing fields by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub question: String,
    pub answer: String,
}

/// The shape shared by many notes: which fields they have, and which
/// templates turn them into cards.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteType {
    pub id: Uuid,
    pub name: String,
    pub fields: Vec<Field>,
    pub templates: Vec<Template>,
    pub app_data: AppData,
}
impl NoteType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            fields: Vec::new(),
            templates: Vec::new(),
            app_data: AppData::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(Field { name: name.into() });
        self
    }

    pub fn with_template(
        mut self,
        name: impl Into<String>,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        self.templates.push(Template {
            name: name.into(),
            question: question.into(),
            answer: answer.into(),
        });
        self
    }

    /// Whether cards are generated from cloze deletions in the note text
    /// instead of one card per template.
    pub fn is_cloze(&self) -> bool {
        self.templates.iter().any(|t| t.question.contains("{{cloze:") || t.answer.contains("{{cloze:"))
    }
}

/// A single fact, stored as ordered `(field name, value)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: Uuid,
    pub note_type_id: Uuid,
    pub deck_id: Uuid,
    pub fields: Vec<(String, String)>,
    pub tags: Vec<String>,
    pub app_data: AppData,
}
impl Note {
    pub fn new(note_type_id: Uuid, deck_id: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            note_type_id,
            deck_id,
            fields: Vec::new(),
            tags: Vec::new(),
            app_data: AppData::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }
}

/// Something to review: a note rendered through one template.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub id: Uuid,
    pub note_id: Uuid,
    /// Zero-based template ordinal (or cloze group index minus one).
    pub template: u32,
    pub app_data: AppData,
}
impl Card {
    pub fn new(note_id: Uuid, template: u32) -> Self {
        Self { id: Uuid::now_v7(), note_id, template, app_data: AppData::new() }
    }
}

/// How well a card was recalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Score {
    Again,
    Hard,
    Normal,
    Easy,
}

/// A single review event.
#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub id: Uuid,
    pub card_id: Uuid,
    pub score: Score,
    pub reviewed_at: UtcDateTime,
    pub app_data: AppData,
}
impl Review {
    pub fn new(card_id: Uuid, score: Score, reviewed_at: UtcDateTime) -> Self {
        Self { id: Uuid::now_v7(), card_id, score, reviewed_at, app_data: AppData::new() }
    }
}
