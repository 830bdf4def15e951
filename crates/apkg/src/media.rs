//! Media files staged next to a package's collection.
//!
//! Files are staged under their own names in a private temporary directory,
//! and only numbered when the package is written back out.

use exn::ResultExt;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::consts::{MEDIA_SRC_REGEX, SOUND_REGEX};
use crate::error::{ErrorKind, Result};

const COPY_BUFFER_LEN: usize = 64 * 1024;

/// Where the content of a new media file comes from.
pub enum MediaSource {
    /// Copy an existing file.
    Path(PathBuf),
    Bytes(Vec<u8>),
    /// Stream from any reader until it's exhausted.
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}
impl std::fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Reader(_) => f.write_str("Reader"),
        }
    }
}
impl From<PathBuf> for MediaSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}
impl From<&Path> for MediaSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}
impl From<Vec<u8>> for MediaSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}
impl From<&[u8]> for MediaSource {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

/// Check that a media name is a single, plain file name: no directories, no
/// `.` or `..`, no null bytes.
pub(crate) fn validate_name(name: &str) -> Result<&str> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None)
            if part == name && !name.contains(['\0', '/', '\\']) && name.trim() == name =>
        {
            Ok(name)
        },
        _ => exn::bail!(ErrorKind::InvalidMediaName(name.to_string())),
    }
}

/// Every media name referenced from some field text: `src` attributes of
/// embedded images, audio and video, and `[sound:…]` markers.
pub fn references(text: &str) -> BTreeSet<String> {
    let sources = MEDIA_SRC_REGEX
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)));
    let sounds = SOUND_REGEX.captures_iter(text).filter_map(|caps| caps.get(1));
    sources.chain(sounds).map(|m| m.as_str().trim().to_string()).filter(|name| !name.is_empty()).collect()
}

/// Copy `reader` into `target`. Failing reads are the source's fault
/// ([`ErrorKind::UnreadableSource`]); failing writes are [`ErrorKind::Io`].
async fn copy<R, W>(reader: &mut R, target: &mut W, name: &str) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_LEN];
    let mut written = 0u64;
    loop {
        let read = reader.read(&mut buf).await.or_raise(|| ErrorKind::UnreadableSource(name.to_string()))?;
        if read == 0 {
            break;
        }
        target.write_all(&buf[..read]).await.or_raise(|| ErrorKind::Io)?;
        written += read as u64;
    }
    target.flush().await.or_raise(|| ErrorKind::Io)?;
    Ok(written)
}

#[derive(Debug)]
pub(crate) struct MediaStore {
    dir: TempDir,
}
impl MediaStore {
    pub(crate) fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("deckhand-media-").tempdir().or_raise(|| ErrorKind::Io)?;
        Ok(Self { dir })
    }

    pub(crate) fn root(&self) -> &Path {
        self.dir.path()
    }

    /// A name that could never have been staged is simply not found.
    fn existing(&self, name: &str) -> Result<PathBuf> {
        let path = validate_name(name).ok().map(|name| self.dir.path().join(name));
        match path {
            Some(path) if path.is_file() => Ok(path),
            _ => exn::bail!(ErrorKind::MediaNotFound(name.to_string())),
        }
    }

    /// Names of every staged file, sorted.
    pub(crate) async fn list(&self) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(self.dir.path()).await.or_raise(|| ErrorKind::Io)?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.or_raise(|| ErrorKind::Io)? {
            let file_type = entry.file_type().await.or_raise(|| ErrorKind::Io)?;
            if !file_type.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => tracing::warn!(?name, "Skipping media file with a non UTF-8 name"),
            }
        }
        names.sort();
        Ok(names)
    }

    pub(crate) async fn size(&self, name: &str) -> Result<u64> {
        let path = self.existing(name)?;
        let metadata = fs::metadata(&path).await.or_raise(|| ErrorKind::MediaNotFound(name.to_string()))?;
        Ok(metadata.len())
    }

    pub(crate) async fn open(&self, name: &str) -> Result<File> {
        let path = self.existing(name)?;
        File::open(&path).await.or_raise(|| ErrorKind::MediaNotFound(name.to_string()))
    }

    /// Stage a new file. Partially written files are removed if the copy
    /// fails halfway through.
    pub(crate) async fn add(&self, name: &str, source: MediaSource) -> Result<u64> {
        let path = self.dir.path().join(validate_name(name)?);
        let mut target = match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                exn::bail!(ErrorKind::MediaAlreadyExists(name.to_string()))
            },
            Err(err) => return Err(err).or_raise(|| ErrorKind::Io),
        };
        let written = match source {
            MediaSource::Bytes(bytes) => copy(&mut bytes.as_slice(), &mut target, name).await,
            MediaSource::Path(source) => match File::open(&source).await {
                Ok(mut file) => copy(&mut file, &mut target, name).await,
                Err(err) => Err(err).or_raise(|| ErrorKind::UnreadableSource(name.to_string())),
            },
            MediaSource::Reader(mut reader) => copy(&mut reader, &mut target, name).await,
        };
        let written = match written {
            Ok(written) => written,
            Err(err) => {
                drop(target);
                if let Err(cleanup) = fs::remove_file(&path).await {
                    tracing::warn!(path = %path.display(), error = %cleanup, "Could not remove partial media file");
                }
                return Err(err);
            },
        };
        tracing::debug!(name, bytes = written, "Added media file");
        Ok(written)
    }

    pub(crate) async fn remove(&self, name: &str) -> Result<()> {
        let path = self.existing(name)?;
        fs::remove_file(&path).await.or_raise(|| ErrorKind::MediaNotFound(name.to_string()))
    }

    /// Remove every staged file whose name isn't in `referenced`, returning the
    /// removed names (sorted).
    pub(crate) async fn retain(&self, referenced: &BTreeSet<String>) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for name in self.list().await? {
            if referenced.contains(&name) {
                continue;
            }
            self.remove(&name).await?;
            removed.push(name);
        }
        Ok(removed)
    }

    /// Delete the staging directory.
    pub(crate) fn close(self) -> Result<()> {
        self.dir.close().or_raise(|| ErrorKind::Io)
    }
}
