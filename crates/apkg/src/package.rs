use deckhand_database::{Card, Collection, Database, Deck, Issue, Note, NoteType, NoteTypeKind, Review};
use deckhand_package as pkg;
use exn::{OptionExt, ResultExt};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::Path;
use tokio::fs::File;
use tracing::instrument;

use crate::Outcome;
use crate::archive;
use crate::convert::{from_generic, to_generic};
use crate::error::{ErrorKind, Result};
use crate::media::{MediaSource, MediaStore, references};

#[derive(Debug)]
enum State {
    Open { database: Database, media: MediaStore },
    Released,
}

/// An Anki package: one collection database plus its staged media files.
///
/// Packages are created empty, read from an `.apkg` file or converted from a
/// generic package, and can be written back out or converted to a generic
/// package at any point. Call [`cleanup`](AnkiPackage::cleanup) when done;
/// afterwards every operation fails with [`ErrorKind::Unavailable`].
#[derive(Debug)]
pub struct AnkiPackage {
    state: State,
}

impl AnkiPackage {
    fn with_database(database: Database) -> Result<Self> {
        let media = MediaStore::new()?;
        Ok(Self { state: State::Open { database, media } })
    }

    fn from_database(outcome: deckhand_database::Outcome<Database>) -> Outcome<Self> {
        let (database, issues) = match outcome.into_parts() {
            (Ok(database), issues) => (database, issues),
            (Err(err), _) => return Outcome::Failure(ErrorKind::database(err)),
        };
        match Self::with_database(database) {
            Ok(package) => Outcome::with_issues(package, issues),
            Err(err) => Outcome::Failure(err),
        }
    }

    /// An empty package: the default deck, the default deck configuration,
    /// and nothing else.
    #[instrument(name = "creating package")]
    pub async fn from_default() -> Outcome<Self> {
        Self::from_database(Database::from_default().await)
    }

    /// Read an `.apkg` file.
    #[instrument(name = "reading package", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn from_archive_file(path: impl AsRef<Path>) -> Outcome<Self> {
        Self::read_archive(path.as_ref()).await.into()
    }

    async fn read_archive(path: &Path) -> Result<Self> {
        let media = MediaStore::new()?;
        let source = path.to_path_buf();
        let staging = media.root().to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || archive::read(&source, &staging))
            .await
            .or_raise(|| ErrorKind::Io)??;
        let database = Database::from_bytes(&extracted.collection).await.map_err(ErrorKind::database)?;
        tracing::info!(version = ?extracted.version, media = extracted.media.len(), "Read package");
        Ok(Self { state: State::Open { database, media } })
    }

    /// Convert a generic package.
    #[instrument(name = "converting generic package", skip_all)]
    pub async fn from_generic_package(package: &pkg::Package) -> Outcome<Self> {
        let dump = match from_generic(package) {
            Ok(dump) => dump,
            Err(err) => return Outcome::Failure(err),
        };
        Self::from_database(Database::from_dump(&dump).await)
    }

    fn database(&self) -> Result<&Database> {
        match &self.state {
            State::Open { database, .. } => Ok(database),
            State::Released => exn::bail!(ErrorKind::Unavailable),
        }
    }

    fn media(&self) -> Result<&MediaStore> {
        match &self.state {
            State::Open { media, .. } => Ok(media),
            State::Released => exn::bail!(ErrorKind::Unavailable),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Open { .. })
    }

    // =========================================================================
    // Extract
    // =========================================================================

    pub async fn collection(&self) -> Result<Collection> {
        self.database()?.collection().await.map_err(ErrorKind::database)
    }

    /// Global collection configuration.
    pub async fn config(&self) -> Result<Map<String, Value>> {
        Ok(self.collection().await?.conf)
    }

    pub async fn decks(&self) -> Result<Vec<Deck>> {
        Ok(self.collection().await?.decks.into_values().collect())
    }

    pub async fn note_types(&self) -> Result<Vec<NoteType>> {
        Ok(self.collection().await?.models.into_values().collect())
    }

    pub async fn notes(&self) -> Result<Vec<Note>> {
        self.database()?.notes().await.map_err(ErrorKind::database)
    }

    pub async fn cards(&self) -> Result<Vec<Card>> {
        self.database()?.cards().await.map_err(ErrorKind::database)
    }

    pub async fn reviews(&self) -> Result<Vec<Review>> {
        self.database()?.reviews().await.map_err(ErrorKind::database)
    }

    // =========================================================================
    // Insert
    // =========================================================================
    // Rows are written as given: no ids are derived and no cards generated.

    pub async fn add_note_type(&self, note_type: NoteType) -> Result<NoteType> {
        self.database()?.add_note_type(note_type).await.map_err(ErrorKind::database)
    }

    pub async fn add_deck(&self, deck: Deck) -> Result<Deck> {
        self.database()?.add_deck(deck).await.map_err(ErrorKind::database)
    }

    /// Fails with [`ErrorKind::NoteTypeNotFound`] unless the note's note type
    /// exists.
    pub async fn add_note(&self, note: &Note) -> Result<Note> {
        let database = self.database()?;
        if !self.collection().await?.models.contains_key(&note.mid) {
            exn::bail!(ErrorKind::NoteTypeNotFound(note.mid));
        }
        database.add_note(note).await.map_err(ErrorKind::database)
    }

    /// Fails unless the card's note and deck exist, and (for standard note
    /// types) its ordinal names one of the note type's templates.
    pub async fn add_card(&self, card: &Card) -> Result<Card> {
        let database = self.database()?;
        let collection = self.collection().await?;
        let notes = self.notes().await?;
        let note = notes
            .iter()
            .find(|note| note.id == card.nid)
            .ok_or_raise(|| ErrorKind::NoteNotFound(card.nid))?;
        if !collection.decks.contains_key(&card.did) {
            exn::bail!(ErrorKind::DeckNotFound(card.did));
        }
        let note_type = collection.models.get(&note.mid).ok_or_raise(|| ErrorKind::NoteTypeNotFound(note.mid))?;
        let out_of_bounds = card.ord < 0 || card.ord as usize >= note_type.tmpls.len();
        if note_type.kind == NoteTypeKind::Standard && out_of_bounds {
            exn::bail!(ErrorKind::TemplateOutOfBounds { ord: card.ord, count: note_type.tmpls.len() });
        }
        database.add_card(card).await.map_err(ErrorKind::database)
    }

    /// Fails with [`ErrorKind::CardNotFound`] unless the reviewed card exists.
    pub async fn add_review(&self, review: &Review) -> Result<Review> {
        let database = self.database()?;
        if !self.cards().await?.iter().any(|card| card.id == review.cid) {
            exn::bail!(ErrorKind::CardNotFound(review.cid));
        }
        database.add_review(review).await.map_err(ErrorKind::database)
    }

    // =========================================================================
    // Media
    // =========================================================================

    /// Names of every media file, sorted.
    pub async fn list_media_files(&self) -> Result<Vec<String>> {
        self.media()?.list().await
    }

    pub async fn media_file_size(&self, name: &str) -> Result<u64> {
        self.media()?.size(name).await
    }

    /// Open a media file for reading.
    pub async fn media_file(&self, name: &str) -> Result<File> {
        self.media()?.open(name).await
    }

    /// Add a media file, returning the number of bytes written.
    pub async fn add_media_file(&self, name: &str, source: impl Into<MediaSource>) -> Result<u64> {
        self.media()?.add(name, source.into()).await
    }

    pub async fn remove_media_file(&self, name: &str) -> Result<()> {
        self.media()?.remove(name).await
    }

    /// Remove every media file that no note references, returning the removed
    /// names (sorted).
    #[instrument(name = "removing unreferenced media", skip_all)]
    pub async fn remove_unreferenced_media_files(&self) -> Result<Vec<String>> {
        let media = self.media()?;
        let referenced = self.notes().await?.iter().flat_map(|note| references(&note.flds)).collect::<BTreeSet<_>>();
        let removed = media.retain(&referenced).await?;
        tracing::info!(referenced = referenced.len(), removed = removed.len(), "Removed unreferenced media");
        Ok(removed)
    }

    // =========================================================================
    // Export
    // =========================================================================

    /// Write the package as an `.apkg` file.
    #[instrument(name = "writing package", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn to_archive_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let media = self.media()?;
        let collection = self.database()?.to_bytes().await.map_err(ErrorKind::database)?;
        let names = media.list().await?;
        let target = path.as_ref().to_path_buf();
        let staging = media.root().to_path_buf();
        tokio::task::spawn_blocking(move || archive::write(&target, &collection, &staging, &names))
            .await
            .or_raise(|| ErrorKind::Io)??;
        Ok(())
    }

    /// Convert to a generic package. Media files are not part of the generic
    /// model.
    #[instrument(name = "converting to generic package", skip_all)]
    pub async fn to_generic_package(&self) -> Result<pkg::Package> {
        let dump = self.database()?.to_dump().await.map_err(ErrorKind::database)?;
        to_generic(&dump)
    }

    /// Close the database and delete every staged file.
    ///
    /// Never fails: anything that couldn't be removed is reported as a
    /// warning. Cleaning up twice does nothing.
    pub async fn cleanup(&mut self) -> Vec<Issue> {
        let State::Open { mut database, media } = std::mem::replace(&mut self.state, State::Released) else {
            return Vec::new();
        };
        let mut issues = Vec::new();
        if let Err(err) = database.close().await {
            tracing::warn!(error = %err, "Could not remove collection database");
            issues.push(Issue::warning(format!("could not remove collection database: {err}")));
        }
        if let Err(err) = media.close() {
            tracing::warn!(error = %err, "Could not remove staged media");
            issues.push(Issue::warning(format!("could not remove staged media: {err}")));
        }
        issues
    }
}
