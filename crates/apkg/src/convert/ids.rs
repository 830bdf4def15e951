//! Vendor identifiers, checksums and sort fields.

use sha1::{Digest, Sha1};
use std::collections::HashSet;

use crate::consts::HTML_TAG_REGEX;

const BASE91_TABLE: &[u8; 91] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!#$%&()*+,-./:;<=>?@[]^_`{|}~";

/// A stable vendor id for an entity that doesn't have one yet.
///
/// The first 8 bytes of the BLAKE3 hash of `source`, as a big-endian integer
/// masked to 63 bits. Never below 2, so a derived id can't collide with the
/// default deck.
pub fn derive_id(source: impl AsRef<[u8]>) -> i64 {
    let hash = blake3::hash(source.as_ref());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    let id = (u64::from_be_bytes(prefix) & i64::MAX as u64) as i64;
    id.max(2)
}

/// Encode a number with the 91 printable ASCII characters used in note guids.
pub fn base91(mut value: u64) -> String {
    let mut digits = Vec::new();
    loop {
        digits.push(BASE91_TABLE[(value % 91) as usize]);
        value /= 91;
        if value == 0 {
            break;
        }
    }
    digits.reverse();
    digits.into_iter().map(char::from).collect()
}

/// Hands out random note guids, never the same one twice.
#[derive(Debug, Default)]
pub(crate) struct Guids {
    used: HashSet<String>,
}
impl Guids {
    /// Claim `guid` if it's still free.
    pub(crate) fn claim(&mut self, guid: &str) -> bool {
        !guid.is_empty() && self.used.insert(guid.to_string())
    }

    pub(crate) fn fresh(&mut self) -> String {
        loop {
            let guid = base91(rand::random::<u64>());
            if self.used.insert(guid.clone()) {
                return guid;
            }
        }
    }
}

/// Field text with markup removed, as used for sorting and duplicate checks.
pub fn strip_html(text: &str) -> String {
    HTML_TAG_REGEX
        .replace_all(text, "")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// The first 8 hex digits of the SHA-1 of the stripped field, as an integer.
pub fn checksum(field: &str) -> i64 {
    let digest = Sha1::digest(strip_html(field).as_bytes());
    let mut prefix = [0u8; 4];
    prefix.copy_from_slice(&digest[..4]);
    u32::from_be_bytes(prefix) as i64
}
