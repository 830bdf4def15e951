use crate::models::{Card, Collection, Grave, Note, Review};

/// Every row of a collection database, held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dump {
    pub collection: Collection,
    pub notes: Vec<Note>,
    pub cards: Vec<Card>,
    pub reviews: Vec<Review>,
    pub graves: Vec<Grave>,
}
