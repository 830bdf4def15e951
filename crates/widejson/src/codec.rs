use exn::ResultExt;
use regex::{Captures, Regex};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use std::collections::BTreeSet;

use crate::error::{ErrorKind, Result};
use crate::path::{FieldPath, Segment};

/// Serialize a value to JSON text.
///
/// [`WideInt`](crate::WideInt) values are written as bare numeric tokens
/// with every digit intact.
pub fn to_string<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).or_raise(|| ErrorKind::Serialize)
}

/// A progress marker while walking the document: `(path index, segments consumed)`.
type Cursor = (usize, usize);

/// Parser for JSON documents where the integers at some known paths may be
/// wider than a double can represent.
///
/// Parsing happens in three steps:
///
/// 1. **Validate**: the document is parsed as-is, and every value reachable
///    through a declared path must be a number (or `null`).
/// 2. **Requote**: every `"name": <integer>` pair whose field name ends a
///    declared path is rewritten to `"name": "<integer>"` so no digits are lost
///    when the text is parsed again.
/// 3. **Convert**: the requoted text is parsed; values on a declared path keep
///    their exact digit strings (consumed by [`WideInt`](crate::WideInt)),
///    while requoted values of the same names that are *not* on a declared path
///    are turned back into ordinary numbers.
///
/// The requote step only knows field names, not positions, which is why the
/// convert step has to be path-aware.
#[derive(Debug, Clone)]
pub struct WideJson {
    paths: Vec<FieldPath>,
    names: BTreeSet<String>,
    requote: Regex,
}
impl WideJson {
    /// Build a parser from textual paths such as `"*.flds[].id"`.
    pub fn new<I, S>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let paths = paths.into_iter().map(|p| p.as_ref().parse::<FieldPath>()).collect::<Result<Vec<_>>>()?;
        Self::from_paths(paths)
    }

    pub fn from_paths(paths: Vec<FieldPath>) -> Result<Self> {
        let names = paths.iter().map(|p| p.field_name().to_string()).collect::<BTreeSet<_>>();
        let alternatives = names.iter().map(|n| regex::escape(n)).collect::<Vec<_>>().join("|");
        // The leading group keeps escaped quotes inside string values from
        // being mistaken for a key. Fractions and exponents are captured so
        // they can be left alone; nothing after the number is consumed, so
        // adjacent pairs in compact text all match.
        let pattern = format!(r#"(^|[^\\])"({alternatives})"\s*:\s*(-?\d+)(\.\d+)?([eE][+-]?\d+)?"#);
        let requote = Regex::new(&pattern).or_raise(|| ErrorKind::InvalidPath(alternatives))?;
        Ok(Self { paths, names, requote })
    }

    pub fn paths(&self) -> &[FieldPath] {
        &self.paths
    }

    /// Parse JSON text into `T`, preserving declared wide integers.
    pub fn parse<T: DeserializeOwned>(&self, text: &str) -> Result<T> {
        let value = self.parse_value(text)?;
        serde_json::from_value(value).or_raise(|| ErrorKind::Deserialize)
    }

    /// Parse JSON text into a [`Value`] tree in which every declared wide
    /// integer is held as an exact string of digits.
    pub fn parse_value(&self, text: &str) -> Result<Value> {
        let plain: Value = serde_json::from_str(text).or_raise(|| ErrorKind::Syntax)?;
        self.validate(&plain, &self.root(), None)?;
        if self.paths.is_empty() {
            return Ok(plain);
        }
        let requoted = self.requote(text);
        let mut tree: Value = serde_json::from_str(&requoted).or_raise(|| ErrorKind::Syntax)?;
        self.convert(&mut tree, &self.root());
        Ok(tree)
    }

    fn root(&self) -> Vec<Cursor> {
        (0..self.paths.len()).map(|p| (p, 0)).collect()
    }

    /// Advance every cursor that can step over a child keyed by `key` (or an
    /// array element when `key` is `None`).
    fn advance(&self, cursors: &[Cursor], key: Option<&str>) -> Vec<Cursor> {
        cursors
            .iter()
            .filter(|(p, i)| match (self.paths[*p].segments().get(*i), key) {
                (Some(Segment::Field(name)), Some(key)) => name == key,
                (Some(Segment::AnyValue), Some(_)) => true,
                (Some(Segment::Each), None) => true,
                _ => false,
            })
            .map(|(p, i)| (*p, i + 1))
            .collect()
    }

    fn completed<'a>(&'a self, cursors: &[Cursor]) -> Option<&'a FieldPath> {
        cursors.iter().find(|(p, i)| *i == self.paths[*p].segments().len()).map(|(p, _)| &self.paths[*p])
    }

    fn validate(&self, value: &Value, cursors: &[Cursor], key: Option<&str>) -> Result<()> {
        if cursors.is_empty() {
            return Ok(());
        }
        if let Some(path) = self.completed(cursors)
            && !matches!(value, Value::Number(_) | Value::Null)
        {
            exn::bail!(ErrorKind::NonNumericField {
                field: key.unwrap_or_default().to_string(),
                path: path.to_string(),
                value: value.to_string(),
            });
        }
        match value {
            Value::Object(map) => {
                for (k, v) in map {
                    self.validate(v, &self.advance(cursors, Some(k)), Some(k))?;
                }
            },
            Value::Array(items) => {
                let next = self.advance(cursors, None);
                for v in items {
                    self.validate(v, &next, key)?;
                }
            },
            _ => {},
        }
        Ok(())
    }

    fn requote(&self, text: &str) -> String {
        self.requote
            .replace_all(text, |caps: &Captures<'_>| match caps.get(4).or_else(|| caps.get(5)) {
                Some(_) => caps[0].to_string(),
                None => format!(r#"{}"{}": "{}""#, &caps[1], &caps[2], &caps[3]),
            })
            .into_owned()
    }

    fn convert(&self, value: &mut Value, cursors: &[Cursor]) {
        match value {
            Value::Object(map) => self.convert_object(map, cursors),
            Value::Array(items) => {
                let next = self.advance(cursors, None);
                for v in items {
                    self.convert(v, &next);
                }
            },
            _ => {},
        }
    }

    fn convert_object(&self, map: &mut Map<String, Value>, cursors: &[Cursor]) {
        for (k, v) in map.iter_mut() {
            let next = self.advance(cursors, Some(k));
            let declared = self.completed(&next).is_some();
            if declared && let Value::Number(number) = v && number.is_f64() {
                tracing::debug!(field = %k, value = %number, "Declared wide integer holds a non-integer number");
            }
            if !declared
                && self.names.contains(k.as_str())
                && let Value::String(s) = v
                && let Some(number) = requoted_number(s)
            {
                // Over-quoted by name only; this one was never meant to be wide.
                *v = Value::Number(number);
                continue;
            }
            self.convert(v, &next);
        }
    }
}

fn requoted_number(s: &str) -> Option<Number> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<Number>().ok()
}

/// Convenience for one-off parsing with textual paths.
pub fn parse<T: DeserializeOwned>(text: &str, paths: &[&str]) -> Result<T> {
    WideJson::new(paths)?.parse(text)
}
