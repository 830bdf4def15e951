//! Field paths that target values inside a JSON document.
//!
//! A path is written as dotted segments: a plain segment names an object
//! field, a `[]` suffix descends into every element of an array, and a `*`
//! segment descends into every value of an object (the vendor registries are
//! maps keyed by stringified ids). For example `*.flds[].id` targets the `id`
//! of every field of every note type in the `models` map.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::{Error, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Descend into the named field of an object.
    Field(String),
    /// Descend into every element of an array.
    Each,
    /// Descend into every value of an object.
    AnyValue,
}

/// A parsed field path. Parse once, reuse for every document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    segments: Vec<Segment>,
}
impl FieldPath {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Name of the field the path terminates at.
    ///
    /// Always present: parsing rejects paths that end anywhere else, because
    /// only `"name": value` pairs can be found (and requoted) textually.
    pub fn field_name(&self) -> &str {
        match self.segments.last() {
            Some(Segment::Field(name)) => name,
            _ => unreachable!("paths are validated to end in a field segment"),
        }
    }
}
impl FromStr for FieldPath {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        for part in s.split('.') {
            let (name, arrays) = match part.find("[]") {
                Some(index) => part.split_at(index),
                None => (part, ""),
            };
            // Everything after the field name must be a run of "[]" markers,
            // e.g. "grid[][]".
            if arrays.len() % 2 != 0 || arrays.as_bytes().chunks(2).any(|c| c != b"[]") {
                exn::bail!(ErrorKind::InvalidPath(s.to_string()));
            }
            match name {
                "" if arrays.is_empty() => exn::bail!(ErrorKind::InvalidPath(s.to_string())),
                "" => {},
                "*" => segments.push(Segment::AnyValue),
                _ if name.contains(['[', ']', '"']) => exn::bail!(ErrorKind::InvalidPath(s.to_string())),
                _ => segments.push(Segment::Field(name.to_string())),
            }
            segments.extend(std::iter::repeat_n(Segment::Each, arrays.len() / 2));
        }
        if !matches!(segments.last(), Some(Segment::Field(_))) {
            exn::bail!(ErrorKind::InvalidPath(s.to_string()));
        }
        Ok(Self { raw: s.to_string(), segments })
    }
}
impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn field(name: &str) -> Segment {
        Segment::Field(name.to_string())
    }

    #[rstest]
    #[case("id", vec![field("id")])]
    #[case("users[].id", vec![field("users"), Segment::Each, field("id")])]
    #[case("*.flds[].id", vec![Segment::AnyValue, field("flds"), Segment::Each, field("id")])]
    #[case("grid[][].id", vec![field("grid"), Segment::Each, Segment::Each, field("id")])]
    fn test_parse(#[case] input: &str, #[case] expected: Vec<Segment>) {
        let path = input.parse::<FieldPath>().unwrap();
        assert_eq!(path.segments(), expected.as_slice());
        assert_eq!(path.to_string(), input);
    }

    #[rstest]
    #[case("")]
    #[case("users[]")]
    #[case("users.*")]
    #[case("a..b")]
    #[case("a[x].b")]
    #[case("a[.b")]
    fn test_parse_rejects(#[case] input: &str) {
        let err = input.parse::<FieldPath>().unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[test]
    fn test_field_name() {
        let path = "*.tmpls[].id".parse::<FieldPath>().unwrap();
        assert_eq!(path.field_name(), "id");
    }
}
