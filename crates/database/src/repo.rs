//! Typed reads and writes of collection rows.
//!
//! Decks and note types live inside the collection row's JSON documents, so
//! adding one rewrites the collection. Everything else is a row of its own.

use exn::{OptionExt, ResultExt};
use sqlx::SqliteConnection;

use crate::db::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{Card, Collection, CollectionRow, Deck, Dump, Grave, GraveKind, Note, NoteType, Review};

async fn write_collection(conn: &mut SqliteConnection, collection: &Collection) -> Result<()> {
    let row = CollectionRow::try_from(collection)?;
    sqlx::query(include_str!("../queries/upsert_collection.sql"))
        .bind(row.id)
        .bind(row.crt)
        .bind(row.modified)
        .bind(row.scm)
        .bind(row.ver)
        .bind(row.dty)
        .bind(row.usn)
        .bind(row.ls)
        .bind(row.conf)
        .bind(row.models)
        .bind(row.decks)
        .bind(row.dconf)
        .bind(row.tags)
        .execute(conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(())
}

async fn read_collection(conn: &mut SqliteConnection) -> Result<Collection> {
    let row: Option<CollectionRow> = sqlx::query_as(include_str!("../queries/get_collection.sql"))
        .fetch_optional(conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    row.ok_or_raise(|| ErrorKind::NotFound("collection", 1))?.try_into()
}

async fn insert_note(conn: &mut SqliteConnection, note: &Note) -> Result<Note> {
    sqlx::query_as(include_str!("../queries/insert_note.sql"))
        .bind(note.id)
        .bind(&note.guid)
        .bind(note.mid)
        .bind(note.modified)
        .bind(note.usn)
        .bind(&note.tags)
        .bind(&note.flds)
        .bind(&note.sfld)
        .bind(note.csum)
        .bind(note.flags)
        .bind(&note.data)
        .fetch_one(conn)
        .await
        .or_raise(|| ErrorKind::Database)
}

async fn insert_card(conn: &mut SqliteConnection, card: &Card) -> Result<Card> {
    sqlx::query_as(include_str!("../queries/insert_card.sql"))
        .bind(card.id)
        .bind(card.nid)
        .bind(card.did)
        .bind(card.ord)
        .bind(card.modified)
        .bind(card.usn)
        .bind(card.card_type)
        .bind(card.queue)
        .bind(card.due)
        .bind(card.ivl)
        .bind(card.factor)
        .bind(card.reps)
        .bind(card.lapses)
        .bind(card.left)
        .bind(card.odue)
        .bind(card.odid)
        .bind(card.flags)
        .bind(&card.data)
        .fetch_one(conn)
        .await
        .or_raise(|| ErrorKind::Database)
}

async fn insert_review(conn: &mut SqliteConnection, review: &Review) -> Result<Review> {
    sqlx::query_as(include_str!("../queries/insert_review.sql"))
        .bind(review.id)
        .bind(review.cid)
        .bind(review.usn)
        .bind(review.ease)
        .bind(review.ivl)
        .bind(review.last_ivl)
        .bind(review.factor)
        .bind(review.time)
        .bind(review.review_type)
        .fetch_one(conn)
        .await
        .or_raise(|| ErrorKind::Database)
}

async fn insert_grave(conn: &mut SqliteConnection, grave: &Grave) -> Result<Grave> {
    sqlx::query_as(include_str!("../queries/insert_grave.sql"))
        .bind(grave.usn)
        .bind(grave.oid)
        .bind(grave.kind)
        .fetch_one(conn)
        .await
        .or_raise(|| ErrorKind::Database)
}

impl Database {
    async fn connection(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.pool()?.acquire().await.or_raise(|| ErrorKind::Database)
    }

    // =========================================================================
    // Collection
    // =========================================================================

    pub async fn collection(&self) -> Result<Collection> {
        let mut conn = self.connection().await?;
        read_collection(&mut conn).await
    }

    /// Replace the collection row.
    pub async fn update_collection(&self, collection: &Collection) -> Result<()> {
        let mut conn = self.connection().await?;
        write_collection(&mut conn, collection).await
    }

    /// Register a deck in the collection, replacing any deck with the same id.
    pub async fn add_deck(&self, deck: Deck) -> Result<Deck> {
        let mut tx = self.pool()?.begin().await.or_raise(|| ErrorKind::Database)?;
        let mut collection = read_collection(&mut tx).await?;
        collection.decks.insert(deck.id, deck.clone());
        write_collection(&mut tx, &collection).await?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(deck)
    }

    /// Register a note type in the collection, replacing any note type with
    /// the same id.
    pub async fn add_note_type(&self, note_type: NoteType) -> Result<NoteType> {
        let mid = note_type.mid()?;
        let mut tx = self.pool()?.begin().await.or_raise(|| ErrorKind::Database)?;
        let mut collection = read_collection(&mut tx).await?;
        collection.models.insert(mid, note_type.clone());
        write_collection(&mut tx, &collection).await?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(note_type)
    }

    // =========================================================================
    // Insert
    // =========================================================================

    pub async fn add_note(&self, note: &Note) -> Result<Note> {
        insert_note(&mut *self.connection().await?, note).await
    }

    pub async fn add_card(&self, card: &Card) -> Result<Card> {
        insert_card(&mut *self.connection().await?, card).await
    }

    pub async fn add_review(&self, review: &Review) -> Result<Review> {
        insert_review(&mut *self.connection().await?, review).await
    }

    pub async fn add_grave(&self, grave: &Grave) -> Result<Grave> {
        insert_grave(&mut *self.connection().await?, grave).await
    }

    // =========================================================================
    // List
    // =========================================================================

    pub async fn notes(&self) -> Result<Vec<Note>> {
        sqlx::query_as(include_str!("../queries/list_notes.sql"))
            .fetch_all(self.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    pub async fn cards(&self) -> Result<Vec<Card>> {
        sqlx::query_as(include_str!("../queries/list_cards.sql"))
            .fetch_all(self.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    pub async fn reviews(&self) -> Result<Vec<Review>> {
        sqlx::query_as(include_str!("../queries/list_reviews.sql"))
            .fetch_all(self.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    pub async fn graves(&self) -> Result<Vec<Grave>> {
        sqlx::query_as(include_str!("../queries/list_graves.sql"))
            .fetch_all(self.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Delete a note along with its cards and their reviews, leaving graves
    /// for the note and each card.
    pub async fn remove_note(&self, id: i64) -> Result<()> {
        let mut tx = self.pool()?.begin().await.or_raise(|| ErrorKind::Database)?;
        let deleted = sqlx::query(include_str!("../queries/delete_note.sql"))
            .bind(id)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if deleted.rows_affected() == 0 {
            exn::bail!(ErrorKind::NotFound("note", id));
        }
        let cards: Vec<(i64,)> = sqlx::query_as(include_str!("../queries/delete_cards_for_note.sql"))
            .bind(id)
            .fetch_all(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        for (card,) in &cards {
            sqlx::query(include_str!("../queries/delete_reviews_for_card.sql"))
                .bind(card)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            insert_grave(&mut tx, &Grave { usn: -1, oid: *card, kind: GraveKind::Card }).await?;
        }
        insert_grave(&mut tx, &Grave { usn: -1, oid: id, kind: GraveKind::Note }).await?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        tracing::debug!(note = id, cards = cards.len(), "Removed note");
        Ok(())
    }

    // =========================================================================
    // Dump/Restore
    // =========================================================================

    /// Read every row into memory.
    pub async fn to_dump(&self) -> Result<Dump> {
        Ok(Dump {
            collection: self.collection().await?,
            notes: self.notes().await?,
            cards: self.cards().await?,
            reviews: self.reviews().await?,
            graves: self.graves().await?,
        })
    }

    /// Write every row of `dump` in one transaction, replacing the collection.
    pub(crate) async fn restore(&self, dump: &Dump) -> Result<()> {
        let mut tx = self.pool()?.begin().await.or_raise(|| ErrorKind::Database)?;
        write_collection(&mut tx, &dump.collection).await?;
        for note in &dump.notes {
            insert_note(&mut tx, note).await?;
        }
        for card in &dump.cards {
            insert_card(&mut tx, card).await?;
        }
        for review in &dump.reviews {
            insert_review(&mut tx, review).await?;
        }
        for grave in &dump.graves {
            insert_grave(&mut tx, grave).await?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        tracing::debug!(
            notes = dump.notes.len(),
            cards = dump.cards.len(),
            reviews = dump.reviews.len(),
            "Restored collection"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DEFAULT_DECK_ID, Field, NoteTypeKind, Template};
    use serde_json::{Map, Value};

    async fn fresh() -> Database {
        Database::from_default().await.into_result().unwrap()
    }

    fn basic_model(id: i64) -> NoteType {
        NoteType {
            id: id.into(),
            name: "Basic".to_string(),
            kind: NoteTypeKind::Standard,
            modified: 0,
            usn: -1,
            sortf: 0,
            did: Some(DEFAULT_DECK_ID),
            tmpls: vec![Template::new("Card 1", 0, "{{Front}}", "{{FrontSide}}<hr id=answer>{{Back}}")],
            flds: vec![Field::new("Front", 0), Field::new("Back", 1)],
            css: String::new(),
            latex_pre: String::new(),
            latex_post: String::new(),
            req: Value::Null,
            extra: Map::new(),
        }
    }

    fn note(id: i64, mid: i64) -> Note {
        Note {
            id,
            guid: format!("guid{id}"),
            mid,
            modified: 0,
            usn: -1,
            tags: Note::join_tags(&["tag"]),
            flds: Note::join_fields(&["front", "back"]),
            sfld: "front".to_string(),
            csum: 123,
            flags: 0,
            data: String::new(),
        }
    }

    fn card(id: i64, nid: i64, ord: i64) -> Card {
        Card {
            id,
            nid,
            did: DEFAULT_DECK_ID,
            ord,
            modified: 0,
            usn: -1,
            card_type: 0,
            queue: 0,
            due: 1,
            ivl: 0,
            factor: 2500,
            reps: 0,
            lapses: 0,
            left: 0,
            odue: 0,
            odid: 0,
            flags: 0,
            data: String::new(),
        }
    }

    fn review(id: i64, cid: i64) -> Review {
        Review { id, cid, usn: -1, ease: 3, ivl: 1, last_ivl: 0, factor: 2500, time: 4000, review_type: 0 }
    }

    #[tokio::test]
    async fn test_add_deck_and_note_type() {
        let mut db = fresh().await;
        db.add_deck(Deck::new(42, "Languages")).await.unwrap();
        db.add_note_type(basic_model(1_700_000_000_000)).await.unwrap();
        let collection = db.collection().await.unwrap();
        assert_eq!(collection.decks[&42].name, "Languages");
        assert_eq!(collection.models[&1_700_000_000_000].flds.len(), 2);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_numeric_sort_field_reads_back_as_text() {
        let mut db = fresh().await;
        let mut numeric = note(1, 2);
        numeric.sfld = "12345".to_string();
        let stored = db.add_note(&numeric).await.unwrap();
        assert_eq!(stored, numeric);
        assert_eq!(db.notes().await.unwrap(), vec![numeric]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_note_leaves_graves() {
        let mut db = fresh().await;
        db.add_note(&note(10, 2)).await.unwrap();
        db.add_card(&card(20, 10, 0)).await.unwrap();
        db.add_card(&card(21, 10, 1)).await.unwrap();
        db.add_review(&review(1_000, 20)).await.unwrap();
        db.remove_note(10).await.unwrap();
        assert!(db.notes().await.unwrap().is_empty());
        assert!(db.cards().await.unwrap().is_empty());
        assert!(db.reviews().await.unwrap().is_empty());
        let graves = db.graves().await.unwrap();
        assert_eq!(graves.len(), 3);
        assert_eq!(graves.last().unwrap(), &Grave { usn: -1, oid: 10, kind: GraveKind::Note });
        assert_eq!(*db.remove_note(10).await.unwrap_err(), ErrorKind::NotFound("note", 10));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_dump_restores_identically() {
        let mut db = fresh().await;
        db.add_note_type(basic_model(5)).await.unwrap();
        db.add_note(&note(10, 5)).await.unwrap();
        db.add_card(&card(20, 10, 0)).await.unwrap();
        db.add_review(&review(1_000, 20)).await.unwrap();
        db.add_grave(&Grave { usn: 0, oid: 99, kind: GraveKind::Deck }).await.unwrap();
        let dump = db.to_dump().await.unwrap();
        db.close().await.unwrap();

        let mut restored = Database::from_dump(&dump).await.into_result().unwrap();
        assert_eq!(restored.to_dump().await.unwrap(), dump);
        restored.close().await.unwrap();
    }
}
