use deckhand::apkg::error::ErrorKind;
use deckhand::database::error::ErrorKind as DatabaseErrorKind;
use deckhand::database::{DEFAULT_DECK_ID, Field, Note, NoteType, NoteTypeKind, Template};
use deckhand::{AnkiPackage, Outcome};
use rstest::rstest;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

fn zip_with(path: &Path, entries: &[(&str, &[u8])]) {
    let mut writer = ZipWriter::new(std::fs::File::create(path).unwrap());
    for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
}

async fn open(path: &Path) -> AnkiPackage {
    match AnkiPackage::from_archive_file(path).await {
        Outcome::Success(package) => package,
        other => panic!("expected a clean import, got {other:?}"),
    }
}

async fn fresh() -> AnkiPackage {
    AnkiPackage::from_default().await.into_result().unwrap()
}

async fn with_note(package: &AnkiPackage, text: &str) {
    let mut note_type = NoteType::new(1_342_697_561_419_i64, "Basic", NoteTypeKind::Standard);
    note_type.flds = vec![Field::new("Front", 0), Field::new("Back", 1)];
    note_type.tmpls = vec![Template::new("Card 1", 0, "{{Front}}", "{{Back}}")];
    let mid = note_type.mid().unwrap();
    package.add_note_type(note_type).await.unwrap();
    package
        .add_note(&Note {
            id: 1_700_000_000_000,
            guid: "f{b:4Ct!9)".to_string(),
            mid,
            modified: 1_700_000_000,
            usn: -1,
            tags: String::new(),
            flds: Note::join_fields(&[text, ""]),
            sfld: text.to_string(),
            csum: 0,
            flags: 0,
            data: String::new(),
        })
        .await
        .unwrap();
}

#[rstest]
#[case::not_a_zip(None, ErrorKind::InvalidArchive)]
#[case::no_collection(Some(("media", b"{}".to_vec())), ErrorKind::MissingCollection)]
#[case::empty_collection(Some(("collection.anki2", Vec::new())), ErrorKind::Database(DatabaseErrorKind::Empty))]
#[case::truncated_collection(
    Some(("collection.anki2", b"SQLite format".to_vec())),
    ErrorKind::Database(DatabaseErrorKind::Truncated)
)]
#[case::not_sqlite(Some(("collection.anki21", vec![7u8; 128])), ErrorKind::Database(DatabaseErrorKind::InvalidHeader))]
#[tokio::test]
async fn test_unreadable_archives(#[case] entry: Option<(&str, Vec<u8>)>, #[case] expected: ErrorKind) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.apkg");
    match entry {
        Some((name, data)) => zip_with(&path, &[(name, data.as_slice())]),
        None => std::fs::write(&path, b"definitely not a zip archive").unwrap(),
    }
    match AnkiPackage::from_archive_file(&path).await {
        Outcome::Failure(err) => assert_eq!(*err, expected),
        other => panic!("expected a failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    match AnkiPackage::from_archive_file(dir.path().join("nowhere.apkg")).await {
        Outcome::Failure(err) => assert_eq!(*err, ErrorKind::Io),
        other => panic!("expected a failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_media_survives_export() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("media.apkg");
    let mut package = fresh().await;
    with_note(&package, r#"<img src="cat.jpg">[sound:meow.mp3]"#).await;
    assert_eq!(package.add_media_file("cat.jpg", b"jpeg bytes".to_vec()).await.unwrap(), 10);
    package.add_media_file("meow.mp3", b"mp3".as_slice()).await.unwrap();
    package.to_archive_file(&path).await.unwrap();
    assert!(package.cleanup().await.is_empty());

    let mut imported = open(&path).await;
    assert_eq!(imported.list_media_files().await.unwrap(), vec!["cat.jpg", "meow.mp3"]);
    assert_eq!(imported.media_file_size("cat.jpg").await.unwrap(), 10);
    let mut content = String::new();
    imported.media_file("cat.jpg").await.unwrap().read_to_string(&mut content).await.unwrap();
    assert_eq!(content, "jpeg bytes");
    assert_eq!(imported.notes().await.unwrap().len(), 1);
    assert_eq!(imported.decks().await.unwrap()[0].id, DEFAULT_DECK_ID);
    assert!(imported.remove_unreferenced_media_files().await.unwrap().is_empty());
    imported.cleanup().await;
}

#[tokio::test]
async fn test_media_names_are_checked() {
    let mut package = fresh().await;
    package.add_media_file("a.png", b"a".as_slice()).await.unwrap();
    let err = package.add_media_file("a.png", b"b".as_slice()).await.unwrap_err();
    assert_eq!(*err, ErrorKind::MediaAlreadyExists("a.png".to_string()));
    let err = package.add_media_file("../escape.png", b"b".as_slice()).await.unwrap_err();
    assert!(matches!(*err, ErrorKind::InvalidMediaName(_)));
    let err = package.remove_media_file("missing.png").await.unwrap_err();
    assert_eq!(*err, ErrorKind::MediaNotFound("missing.png".to_string()));
    package.remove_media_file("a.png").await.unwrap();
    assert!(package.list_media_files().await.unwrap().is_empty());
    package.cleanup().await;
}

#[tokio::test]
async fn test_unreferenced_media_collection() {
    let mut package = fresh().await;
    with_note(&package, "<img src='kept.png'> and <img src=also.gif>").await;
    for name in ["kept.png", "also.gif", "stale.png"] {
        package.add_media_file(name, name.as_bytes()).await.unwrap();
    }
    assert_eq!(package.remove_unreferenced_media_files().await.unwrap(), vec!["stale.png"]);
    assert_eq!(package.list_media_files().await.unwrap(), vec!["also.gif", "kept.png"]);
    package.cleanup().await;
}

#[tokio::test]
async fn test_media_from_path_and_reader() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source.txt");
    std::fs::write(&source, b"from disk").unwrap();
    let mut package = fresh().await;
    assert_eq!(package.add_media_file("disk.txt", source.as_path()).await.unwrap(), 9);
    let reader = deckhand::apkg::MediaSource::Reader(Box::new(std::io::Cursor::new(b"streamed".to_vec())));
    assert_eq!(package.add_media_file("stream.txt", reader).await.unwrap(), 8);
    let err = package.add_media_file("gone.txt", dir.path().join("gone.txt")).await.unwrap_err();
    assert!(matches!(*err, ErrorKind::UnreadableSource(_)));
    assert_eq!(package.list_media_files().await.unwrap(), vec!["disk.txt", "stream.txt"]);
    package.cleanup().await;
}
