use serde::{Deserialize, Serialize};

/// Separates field values in `notes.flds`.
pub const FIELD_SEPARATOR: char = '\x1f';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Note {
    pub id: i64,
    pub guid: String,
    pub mid: i64,
    #[serde(rename = "mod")]
    #[sqlx(rename = "mod")]
    pub modified: i64,
    pub usn: i64,
    /// Space-separated, with a leading and trailing space when non-empty.
    pub tags: String,
    pub flds: String,
    pub sfld: String,
    pub csum: i64,
    pub flags: i64,
    pub data: String,
}
impl Note {
    /// Field values in note type order.
    pub fn fields(&self) -> Vec<&str> {
        self.flds.split(FIELD_SEPARATOR).collect()
    }

    pub fn tag_list(&self) -> Vec<&str> {
        self.tags.split_whitespace().collect()
    }

    pub fn join_fields<S: AsRef<str>>(values: &[S]) -> String {
        let mut joined = String::new();
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                joined.push(FIELD_SEPARATOR);
            }
            joined.push_str(value.as_ref());
        }
        joined
    }

    pub fn join_tags<S: AsRef<str>>(tags: &[S]) -> String {
        match tags.is_empty() {
            true => String::new(),
            false => format!(" {} ", tags.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(" ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Card {
    pub id: i64,
    pub nid: i64,
    pub did: i64,
    pub ord: i64,
    #[serde(rename = "mod")]
    #[sqlx(rename = "mod")]
    pub modified: i64,
    pub usn: i64,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub card_type: i64,
    pub queue: i64,
    pub due: i64,
    pub ivl: i64,
    pub factor: i64,
    pub reps: i64,
    pub lapses: i64,
    pub left: i64,
    pub odue: i64,
    pub odid: i64,
    pub flags: i64,
    pub data: String,
}

/// One `revlog` row. The id is the time of the review in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Review {
    pub id: i64,
    pub cid: i64,
    pub usn: i64,
    pub ease: i64,
    pub ivl: i64,
    #[serde(rename = "lastIvl")]
    #[sqlx(rename = "lastIvl")]
    pub last_ivl: i64,
    pub factor: i64,
    pub time: i64,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub review_type: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[repr(i32)]
pub enum GraveKind {
    Card = 0,
    Note = 1,
    Deck = 2,
}

/// A deletion record, kept so a sync partner can replay it.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Grave {
    pub usn: i64,
    pub oid: i64,
    #[sqlx(rename = "type")]
    pub kind: GraveKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_split_on_separator() {
        let note = Note {
            id: 1,
            guid: "abc".to_string(),
            mid: 2,
            modified: 0,
            usn: -1,
            tags: Note::join_tags(&["one", "two"]),
            flds: Note::join_fields(&["front", "", "back"]),
            sfld: "front".to_string(),
            csum: 0,
            flags: 0,
            data: String::new(),
        };
        assert_eq!(note.fields(), vec!["front", "", "back"]);
        assert_eq!(note.tags, " one two ");
        assert_eq!(note.tag_list(), vec!["one", "two"]);
        assert_eq!(Note::join_tags::<&str>(&[]), "");
    }
}
