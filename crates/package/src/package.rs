use exn::OptionExt;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{ErrorKind, Result};
use crate::models::{Card, Deck, Note, NoteType, Review};

/// An in-memory flashcard package.
///
/// References are checked on insertion: a note needs its note type and deck,
/// a card needs its note, a review needs its card. Entities are kept ordered
/// by id, which (for UUIDv7) is creation order.
#[derive(Debug, Clone, Default)]
pub struct Package {
    decks: BTreeMap<Uuid, Deck>,
    note_types: BTreeMap<Uuid, NoteType>,
    notes: BTreeMap<Uuid, Note>,
    cards: BTreeMap<Uuid, Card>,
    reviews: BTreeMap<Uuid, Review>,
}
impl Package {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Insert
    // =========================================================================

    pub fn add_deck(&mut self, deck: Deck) -> Result<Uuid> {
        Self::insert(&mut self.decks, deck.id, deck)
    }

    pub fn add_note_type(&mut self, note_type: NoteType) -> Result<Uuid> {
        Self::insert(&mut self.note_types, note_type.id, note_type)
    }

    pub fn add_note(&mut self, note: Note) -> Result<Uuid> {
        if !self.note_types.contains_key(&note.note_type_id) {
            exn::bail!(ErrorKind::NoteTypeNotFound(note.note_type_id));
        }
        if !self.decks.contains_key(&note.deck_id) {
            exn::bail!(ErrorKind::DeckNotFound(note.deck_id));
        }
        Self::insert(&mut self.notes, note.id, note)
    }

    /// Add a card. For note types that generate one card per template, the
    /// card's template ordinal must exist; cloze ordinals are unbounded.
    pub fn add_card(&mut self, card: Card) -> Result<Uuid> {
        let note = self.notes.get(&card.note_id).ok_or_raise(|| ErrorKind::NoteNotFound(card.note_id))?;
        let note_type = self
            .note_types
            .get(&note.note_type_id)
            .ok_or_raise(|| ErrorKind::NoteTypeNotFound(note.note_type_id))?;
        if !note_type.is_cloze() && card.template as usize >= note_type.templates.len() {
            exn::bail!(ErrorKind::TemplateOutOfBounds {
                template: card.template,
                count: note_type.templates.len(),
            });
        }
        Self::insert(&mut self.cards, card.id, card)
    }

    pub fn add_review(&mut self, review: Review) -> Result<Uuid> {
        if !self.cards.contains_key(&review.card_id) {
            exn::bail!(ErrorKind::CardNotFound(review.card_id));
        }
        Self::insert(&mut self.reviews, review.id, review)
    }

    fn insert<T>(map: &mut BTreeMap<Uuid, T>, id: Uuid, value: T) -> Result<Uuid> {
        if map.contains_key(&id) {
            exn::bail!(ErrorKind::Duplicate(id));
        }
        map.insert(id, value);
        Ok(id)
    }

    // =========================================================================
    // Remove
    // =========================================================================

    /// Remove a note along with its cards and their reviews.
    pub fn remove_note(&mut self, id: Uuid) -> Result<Note> {
        let note = self.notes.remove(&id).ok_or_raise(|| ErrorKind::NoteNotFound(id))?;
        let cards = self.cards.values().filter(|c| c.note_id == id).map(|c| c.id).collect::<Vec<_>>();
        for card in cards {
            self.remove_card(card)?;
        }
        Ok(note)
    }

    /// Remove a card along with its reviews.
    pub fn remove_card(&mut self, id: Uuid) -> Result<Card> {
        let card = self.cards.remove(&id).ok_or_raise(|| ErrorKind::CardNotFound(id))?;
        let before = self.reviews.len();
        self.reviews.retain(|_, r| r.card_id != id);
        tracing::debug!(card = %id, reviews = before - self.reviews.len(), "Removed card");
        Ok(card)
    }

    // =========================================================================
    // Get/List
    // =========================================================================

    pub fn deck(&self, id: Uuid) -> Option<&Deck> {
        self.decks.get(&id)
    }

    pub fn note_type(&self, id: Uuid) -> Option<&NoteType> {
        self.note_types.get(&id)
    }

    pub fn note(&self, id: Uuid) -> Option<&Note> {
        self.notes.get(&id)
    }

    pub fn card(&self, id: Uuid) -> Option<&Card> {
        self.cards.get(&id)
    }

    pub fn decks(&self) -> impl Iterator<Item = &Deck> {
        self.decks.values()
    }

    pub fn note_types(&self) -> impl Iterator<Item = &NoteType> {
        self.note_types.values()
    }

    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.notes.values()
    }

    pub fn cards(&self) -> impl Iterator<Item = &Card> {
        self.cards.values()
    }

    pub fn reviews(&self) -> impl Iterator<Item = &Review> {
        self.reviews.values()
    }

    pub fn cards_for_note(&self, note_id: Uuid) -> impl Iterator<Item = &Card> {
        self.cards.values().filter(move |c| c.note_id == note_id)
    }
}
