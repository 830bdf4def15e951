//! The `.apkg` zip container.
//!
//! An archive holds a `meta` record naming the collection format, the
//! collection database itself, a `media` manifest mapping numbered entries
//! to file names, and those numbered media entries. Zip access is blocking;
//! callers run these functions on the blocking thread pool.

use exn::{OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{ErrorKind, Result};
use crate::media::validate_name;

const META_ENTRY: &str = "meta";
const MEDIA_MANIFEST_ENTRY: &str = "media";
// Field 1 of the `meta` protobuf message, wire type varint.
const META_VERSION_TAG: u8 = 0x08;

/// The collection format stored in an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// `collection.anki2`
    Legacy1,
    /// `collection.anki21`
    Legacy2,
    /// `collection.anki21b`, a zstd-compressed database with protobuf
    /// configuration. Not supported.
    Latest,
}
impl SchemaVersion {
    pub fn collection_entry(&self) -> &'static str {
        match self {
            Self::Legacy1 => "collection.anki2",
            Self::Legacy2 => "collection.anki21",
            Self::Latest => "collection.anki21b",
        }
    }

    fn number(&self) -> u64 {
        match self {
            Self::Legacy1 => 1,
            Self::Legacy2 => 2,
            Self::Latest => 3,
        }
    }

    /// Read the version out of a `meta` record. `None` when the record
    /// doesn't state one.
    fn from_meta(meta: &[u8]) -> Result<Option<Self>> {
        let Some((&META_VERSION_TAG, rest)) = meta.split_first() else {
            return Ok(None);
        };
        let (version, _) = decode_varint(rest)?;
        match version {
            0 => Ok(None),
            1 => Ok(Some(Self::Legacy1)),
            2 => Ok(Some(Self::Legacy2)),
            other => exn::bail!(ErrorKind::UnsupportedVersion(other)),
        }
    }

    fn to_meta(self) -> Vec<u8> {
        let mut meta = vec![META_VERSION_TAG];
        meta.extend(encode_varint(self.number()));
        meta
    }
}

fn encode_varint(mut value: u64) -> Vec<u8> {
    let mut encoded = Vec::new();
    while value >= 0x80 {
        encoded.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    encoded.push(value as u8);
    encoded
}

fn decode_varint(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    for (i, &byte) in bytes.iter().take(10).enumerate() {
        value |= ((byte & 0x7F) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    exn::bail!(ErrorKind::InvalidArchive)
}

/// What [`read`] found in an archive.
#[derive(Debug)]
pub(crate) struct Extracted {
    pub(crate) version: SchemaVersion,
    pub(crate) collection: Vec<u8>,
    /// Names of the media files written into the staging directory.
    pub(crate) media: Vec<String>,
}

fn read_entry<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<Vec<u8>>> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err).or_raise(|| ErrorKind::InvalidArchive),
    };
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf).or_raise(|| ErrorKind::InvalidArchive)?;
    Ok(Some(buf))
}

/// Unpack an archive: return the collection database and copy every media
/// file listed in the manifest into `media_dir` under its original name.
///
/// Media entries that are missing, or whose names aren't plain file names,
/// are skipped.
pub(crate) fn read(path: &Path, media_dir: &Path) -> Result<Extracted> {
    let file = File::open(path).or_raise(|| ErrorKind::Io)?;
    let mut archive = ZipArchive::new(file).or_raise(|| ErrorKind::InvalidArchive)?;

    let stated = match read_entry(&mut archive, META_ENTRY)? {
        Some(meta) => SchemaVersion::from_meta(&meta)?,
        None => None,
    };
    // Without a stated version, prefer the newer of the two legacy databases.
    let candidates = match stated {
        Some(version) => vec![version],
        None => vec![SchemaVersion::Legacy2, SchemaVersion::Legacy1],
    };
    let mut found = None;
    for version in candidates {
        if let Some(collection) = read_entry(&mut archive, version.collection_entry())? {
            found = Some((version, collection));
            break;
        }
    }
    let (version, collection) = found.ok_or_raise(|| ErrorKind::MissingCollection)?;

    let manifest: BTreeMap<String, String> = match read_entry(&mut archive, MEDIA_MANIFEST_ENTRY)? {
        Some(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes).or_raise(|| ErrorKind::InvalidArchive)?,
        _ => BTreeMap::new(),
    };
    let mut media = Vec::new();
    for (index, name) in manifest {
        if validate_name(&name).is_err() {
            tracing::warn!(%index, %name, "Skipping media file with an invalid name");
            continue;
        }
        let mut entry = match archive.by_name(&index) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => {
                tracing::warn!(%index, %name, "Media file listed in manifest is missing from archive");
                continue;
            },
            Err(err) => return Err(err).or_raise(|| ErrorKind::InvalidArchive),
        };
        let target = media_dir.join(&name);
        let mut out = match File::create_new(&target) {
            Ok(out) => out,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::warn!(%index, %name, "Skipping duplicate media file");
                continue;
            },
            Err(err) => return Err(err).or_raise(|| ErrorKind::Io),
        };
        std::io::copy(&mut entry, &mut out).or_raise(|| ErrorKind::InvalidArchive)?;
        media.push(name);
    }
    media.sort();
    tracing::debug!(?version, media = media.len(), "Read package archive");
    Ok(Extracted { version, collection, media })
}

/// Write an archive: `meta`, the collection database as `collection.anki21`,
/// each media file under a sequential number, and the manifest.
pub(crate) fn write(path: &Path, collection: &[u8], media_dir: &Path, media: &[String]) -> Result<()> {
    let version = SchemaVersion::Legacy2;
    let file = File::create(path).or_raise(|| ErrorKind::Io)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(META_ENTRY, options).or_raise(|| ErrorKind::Io)?;
    zip.write_all(&version.to_meta()).or_raise(|| ErrorKind::Io)?;
    zip.start_file(version.collection_entry(), options).or_raise(|| ErrorKind::Io)?;
    zip.write_all(collection).or_raise(|| ErrorKind::Io)?;

    let mut manifest = BTreeMap::new();
    for (index, name) in media.iter().enumerate() {
        let mut source = File::open(media_dir.join(name)).or_raise(|| ErrorKind::MediaNotFound(name.clone()))?;
        zip.start_file(index.to_string(), options).or_raise(|| ErrorKind::Io)?;
        std::io::copy(&mut source, &mut zip).or_raise(|| ErrorKind::Io)?;
        manifest.insert(index.to_string(), name.as_str());
    }
    let manifest = serde_json::to_vec(&manifest).or_raise(|| ErrorKind::Io)?;
    zip.start_file(MEDIA_MANIFEST_ENTRY, options).or_raise(|| ErrorKind::Io)?;
    zip.write_all(&manifest).or_raise(|| ErrorKind::Io)?;
    zip.finish().or_raise(|| ErrorKind::Io)?;
    tracing::debug!(path = %path.display(), media = media.len(), "Wrote package archive");
    Ok(())
}
