//! Database lifecycle: creating, loading, exporting and releasing the SQLite
//! file behind a collection.

use exn::{OptionExt, ResultExt};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::instrument;

use crate::error::{ErrorKind, Result};
use crate::models::{Collection, Dump};
use crate::outcome::{Issue, Outcome};

/// Every SQLite database starts with this.
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";
/// Size of the SQLite database header; anything shorter can't be a database.
const SQLITE_HEADER_LEN: usize = 100;
/// Tables a collection must have, in the order they're reported when missing.
pub const REQUIRED_TABLES: [&str; 5] = ["cards", "notes", "col", "revlog", "graves"];
const DATABASE_FILENAME: &str = "collection.sqlite";
// Writes are never concurrent, and a single connection keeps the file
// exclusively ours while it's open.
const MAX_CONNECTIONS: u32 = 1;

#[derive(Debug)]
struct Handle {
    pool: SqlitePool,
    path: PathBuf,
    // Dropped after the pool: the file must outlive every connection to it.
    dir: TempDir,
}

#[derive(Debug)]
enum State {
    Open(Handle),
    Released,
}

/// One collection database, stored in a private temporary directory.
///
/// Created empty ([`Database::from_default`]), loaded from the bytes of an
/// existing collection ([`Database::from_bytes`]) or restored from a
/// [`Dump`]. Once [`closed`](Database::close), every operation fails with
/// [`ErrorKind::Unavailable`].
#[derive(Debug)]
pub struct Database {
    state: State,
}

impl Database {
    async fn new(path: PathBuf, dir: TempDir, create: bool) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(Self::base_options().filename(&path).create_if_missing(create))
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::debug!(path = %path.display(), "Opened collection database");
        Ok(Self { state: State::Open(Handle { pool, path, dir }) })
    }

    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            // No sidecar files: the database file alone is the collection.
            .journal_mode(SqliteJournalMode::Delete)
            // The collection schema declares no foreign keys, and relies on
            // the application to keep references intact.
            .foreign_keys(false)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_millis(1500))
    }

    fn scratch() -> Result<(TempDir, PathBuf)> {
        let dir = tempfile::Builder::new().prefix("deckhand-db-").tempdir().or_raise(|| ErrorKind::Io)?;
        let path = dir.path().join(DATABASE_FILENAME);
        Ok((dir, path))
    }

    /// Create a new database with the collection schema and a default
    /// collection row.
    ///
    /// Schema statements that fail are reported as critical issues rather than
    /// aborting; failing to write the collection row is fatal.
    #[instrument(name = "creating collection database")]
    pub async fn from_default() -> Outcome<Self> {
        let db = match Self::scratch() {
            Ok((dir, path)) => Self::new(path, dir, true).await,
            Err(err) => Err(err),
        };
        let db = match db {
            Ok(db) => db,
            Err(err) => return Outcome::Failure(err),
        };
        let issues = match db.execute_statements(include_str!("../queries/schema.sql")).await {
            Ok(issues) => issues,
            Err(err) => return Outcome::Failure(err),
        };
        match db.update_collection(&Collection::default()).await {
            Ok(()) => Outcome::with_issues(db, issues),
            Err(err) => Outcome::Failure(err),
        }
    }

    /// Load a collection from the raw bytes of its SQLite file.
    ///
    /// Checks run from cheapest to most expensive, and the first failure is
    /// reported: [`Empty`](ErrorKind::Empty), [`Truncated`](ErrorKind::Truncated),
    /// [`InvalidHeader`](ErrorKind::InvalidHeader),
    /// [`Corrupted`](ErrorKind::Corrupted) and finally
    /// [`MissingTables`](ErrorKind::MissingTables).
    #[instrument(name = "loading collection database", skip_all, fields(len = buf.len()))]
    pub async fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.is_empty() {
            exn::bail!(ErrorKind::Empty);
        }
        if buf.len() < SQLITE_HEADER_LEN {
            exn::bail!(ErrorKind::Truncated);
        }
        if !buf.starts_with(SQLITE_MAGIC) {
            exn::bail!(ErrorKind::InvalidHeader);
        }
        let (dir, path) = Self::scratch()?;
        tokio::fs::write(&path, buf).await.or_raise(|| ErrorKind::Io)?;
        let db = Self::new(path, dir, false).await.or_raise(|| ErrorKind::Corrupted)?;
        db.validate_schema().await?;
        Ok(db)
    }

    /// Create a new database holding exactly the rows of `dump`.
    #[instrument(name = "restoring collection database", skip_all)]
    pub async fn from_dump(dump: &Dump) -> Outcome<Self> {
        let (db, issues) = match Self::from_default().await.into_parts() {
            (Ok(db), issues) => (db, issues),
            (Err(err), _) => return Outcome::Failure(err),
        };
        match db.restore(dump).await {
            Ok(()) => Outcome::with_issues(db, issues),
            Err(err) => Outcome::Failure(err),
        }
    }

    /// Fail with [`ErrorKind::MissingTables`] unless every table of a
    /// collection is present. Failing to read the catalog at all means the
    /// file is [`Corrupted`](ErrorKind::Corrupted).
    pub async fn validate_schema(&self) -> Result<()> {
        let tables: Vec<(String,)> = sqlx::query_as(include_str!("../queries/list_tables.sql"))
            .fetch_all(self.pool()?)
            .await
            .or_raise(|| ErrorKind::Corrupted)?;
        let missing = REQUIRED_TABLES
            .iter()
            .filter(|required| !tables.iter().any(|(name,)| name == *required))
            .map(|name| name.to_string())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            exn::bail!(ErrorKind::MissingTables(missing));
        }
        Ok(())
    }

    /// Run each `;`-separated statement of `sql` in turn.
    ///
    /// Statements that fail don't stop the rest; each failure is returned as a
    /// critical issue.
    pub async fn execute_statements(&self, sql: &str) -> Result<Vec<Issue>> {
        let pool = self.pool()?;
        let mut issues = Vec::new();
        for statement in split_statements(sql) {
            if let Err(err) = sqlx::query(statement).execute(pool).await {
                tracing::warn!(%statement, error = %err, "Statement failed");
                issues.push(Issue::critical(format!("{err}: {statement}")));
            }
        }
        Ok(issues)
    }

    /// Serialize the database into the bytes of a standalone SQLite file.
    #[instrument(name = "exporting collection database", skip_all)]
    pub async fn to_bytes(&self) -> Result<Vec<u8>> {
        let State::Open(handle) = &self.state else {
            exn::bail!(ErrorKind::Unavailable);
        };
        // VACUUM INTO only writes into a file that's missing or empty.
        let scratch = tempfile::NamedTempFile::new_in(handle.dir.path()).or_raise(|| ErrorKind::Io)?;
        let target = scratch.path().to_str().ok_or_raise(|| ErrorKind::InvalidData("path"))?.to_string();
        sqlx::query("VACUUM INTO ?")
            .bind(target)
            .execute(&handle.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tokio::fs::read(scratch.path()).await.or_raise(|| ErrorKind::Io)
    }

    pub(crate) fn pool(&self) -> Result<&SqlitePool> {
        match &self.state {
            State::Open(handle) => Ok(&handle.pool),
            State::Released => exn::bail!(ErrorKind::Unavailable),
        }
    }

    /// Location of the database file, while it's open.
    pub fn path(&self) -> Option<&Path> {
        match &self.state {
            State::Open(handle) => Some(&handle.path),
            State::Released => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    /// Close every connection and delete the database file.
    ///
    /// Closing an already closed database does nothing. The database is
    /// released even if its directory can't be removed.
    pub async fn close(&mut self) -> Result<()> {
        let State::Open(handle) = std::mem::replace(&mut self.state, State::Released) else {
            return Ok(());
        };
        handle.pool.close().await;
        tracing::debug!(path = %handle.path.display(), "Closed collection database");
        handle.dir.close().or_raise(|| ErrorKind::Io)
    }
}

/// Split SQL text on `;`, ignoring semicolons inside quoted strings.
fn split_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut quote = None;
    let mut start = 0;
    for (i, c) in sql.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if q == c => quote = None,
            (None, ';') => {
                statements.push(&sql[start..i]);
                start = i + 1;
            },
            _ => {},
        }
    }
    statements.push(&sql[start..]);
    statements.into_iter().map(str::trim).filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Severity;
    use rstest::rstest;

    async fn fresh() -> Database {
        match Database::from_default().await {
            Outcome::Success(db) => db,
            other => panic!("expected a clean database, got {other:?}"),
        }
    }

    fn header_then_zeroes(len: usize) -> Vec<u8> {
        let mut buf = SQLITE_MAGIC.to_vec();
        buf.resize(len, 0);
        buf
    }

    #[test]
    fn test_split_statements() {
        let sql = "CREATE TABLE a (x text); INSERT INTO a VALUES ('semi;colon');\n\n  ;SELECT 1";
        assert_eq!(
            split_statements(sql),
            vec!["CREATE TABLE a (x text)", "INSERT INTO a VALUES ('semi;colon')", "SELECT 1"]
        );
    }

    #[tokio::test]
    async fn test_from_default_has_every_table() {
        let mut db = fresh().await;
        db.validate_schema().await.unwrap();
        assert!(db.is_open());
        db.close().await.unwrap();
    }

    #[rstest]
    #[case::empty(Vec::new(), ErrorKind::Empty)]
    #[case::truncated(SQLITE_MAGIC[..10].to_vec(), ErrorKind::Truncated)]
    #[case::invalid_header(vec![0u8; 100], ErrorKind::InvalidHeader)]
    #[case::corrupted(header_then_zeroes(4096), ErrorKind::Corrupted)]
    #[tokio::test]
    async fn test_from_bytes_classification(#[case] buf: Vec<u8>, #[case] expected: ErrorKind) {
        let err = Database::from_bytes(&buf).await.unwrap_err();
        assert_eq!(*err, expected);
    }

    #[tokio::test]
    async fn test_missing_tables() {
        let mut db = fresh().await;
        let issues = db.execute_statements("DROP TABLE graves").await.unwrap();
        assert!(issues.is_empty());
        let bytes = db.to_bytes().await.unwrap();
        db.close().await.unwrap();
        let err = Database::from_bytes(&bytes).await.unwrap_err();
        assert_eq!(*err, ErrorKind::MissingTables(vec!["graves".to_string()]));
    }

    #[tokio::test]
    async fn test_bytes_round_trip() {
        let mut db = fresh().await;
        let bytes = db.to_bytes().await.unwrap();
        assert!(bytes.starts_with(SQLITE_MAGIC));
        db.close().await.unwrap();
        let mut reloaded = Database::from_bytes(&bytes).await.unwrap();
        assert_eq!(reloaded.collection().await.unwrap().decks.len(), 1);
        reloaded.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_statements_become_issues() {
        let mut db = fresh().await;
        let issues = db.execute_statements("SELECT 1; SELEKT nonsense; SELECT 2").await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Critical);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unavailable_after_close() {
        let mut db = fresh().await;
        let path = db.path().unwrap().to_path_buf();
        db.close().await.unwrap();
        assert!(!db.is_open());
        assert!(!path.exists());
        assert_eq!(*db.to_bytes().await.unwrap_err(), ErrorKind::Unavailable);
        assert_eq!(*db.collection().await.unwrap_err(), ErrorKind::Unavailable);
        assert_eq!(*db.notes().await.unwrap_err(), ErrorKind::Unavailable);
        assert_eq!(*db.execute_statements("SELECT 1").await.unwrap_err(), ErrorKind::Unavailable);
        // Closing twice is fine.
        db.close().await.unwrap();
    }
}
