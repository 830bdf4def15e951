use deckhand_widejson::{WideInt, WideJson};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use time::UtcDateTime;

use crate::error::{Error, ErrorKind, Result};
use crate::models::timestamp_millis;

/// The deck every collection starts with, and the fallback for cards whose
/// deck has gone missing.
pub const DEFAULT_DECK_ID: i64 = 1;
pub const DEFAULT_DECK_CONFIG_ID: i64 = 1;
/// Legacy collection schema version (`collection.anki2`/`collection.anki21`).
pub const SCHEMA_VERSION: i64 = 11;

const DEFAULT_CSS: &str = ".card {\n    font-family: arial;\n    font-size: 20px;\n    text-align: center;\n    color: black;\n    background-color: white;\n}\n";
const DEFAULT_LATEX_PRE: &str = "\\documentclass[12pt]{article}\n\\special{papersize=3in,5in}\n\\usepackage[utf8]{inputenc}\n\\usepackage{amssymb,amsmath}\n\\pagestyle{empty}\n\\setlength{\\parindent}{0in}\n\\begin{document}\n";
const DEFAULT_LATEX_POST: &str = "\\end{document}";

/// Paths inside the `models` document that hold randomly generated 64-bit ids.
const MODEL_ID_PATHS: [&str; 3] = ["*.id", "*.flds[].id", "*.tmpls[].id"];

/// The singleton `col` row: global configuration and every registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub crt: i64,
    pub modified: i64,
    pub scm: i64,
    pub ver: i64,
    pub dty: i64,
    pub usn: i64,
    pub ls: i64,
    pub conf: Map<String, Value>,
    pub models: BTreeMap<i64, NoteType>,
    pub decks: BTreeMap<i64, Deck>,
    pub dconf: BTreeMap<i64, DeckConfig>,
    pub tags: Map<String, Value>,
}
impl Default for Collection {
    fn default() -> Self {
        let now = UtcDateTime::now();
        let millis = timestamp_millis(now);
        Self {
            crt: now.date().midnight().as_utc().unix_timestamp(),
            modified: millis,
            scm: millis,
            ver: SCHEMA_VERSION,
            dty: 0,
            usn: 0,
            ls: 0,
            conf: default_conf(),
            models: BTreeMap::new(),
            decks: BTreeMap::from([(DEFAULT_DECK_ID, Deck::new(DEFAULT_DECK_ID, "Default"))]),
            dconf: BTreeMap::from([(DEFAULT_DECK_CONFIG_ID, DeckConfig::new(DEFAULT_DECK_CONFIG_ID, "Default"))]),
            tags: Map::new(),
        }
    }
}

fn default_conf() -> Map<String, Value> {
    let conf = json!({
        "activeDecks": [DEFAULT_DECK_ID],
        "curDeck": DEFAULT_DECK_ID,
        "newSpread": 0,
        "collapseTime": 1200,
        "timeLim": 0,
        "estTimes": true,
        "dueCounts": true,
        "curModel": null,
        "nextPos": 1,
        "sortType": "noteFld",
        "sortBackwards": false,
        "addToCur": true,
        "schedVer": 2,
    });
    match conf {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Whether cards come from templates, or from cloze deletions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum NoteTypeKind {
    #[default]
    Standard,
    Cloze,
}
impl TryFrom<u8> for NoteTypeKind {
    type Error = String;
    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Standard),
            1 => Ok(Self::Cloze),
            other => Err(format!("unknown note type kind: {other}")),
        }
    }
}
impl From<NoteTypeKind> for u8 {
    fn from(kind: NoteTypeKind) -> Self {
        match kind {
            NoteTypeKind::Standard => 0,
            NoteTypeKind::Cloze => 1,
        }
    }
}

/// An entry of the `models` registry.
///
/// Keys this crate doesn't know about are kept in `extra` and written back
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteType {
    pub id: WideInt,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: NoteTypeKind,
    #[serde(rename = "mod", default)]
    pub modified: i64,
    #[serde(default)]
    pub usn: i64,
    #[serde(default)]
    pub sortf: u32,
    #[serde(default)]
    pub did: Option<i64>,
    pub tmpls: Vec<Template>,
    pub flds: Vec<Field>,
    #[serde(default)]
    pub css: String,
    #[serde(rename = "latexPre", default)]
    pub latex_pre: String,
    #[serde(rename = "latexPost", default)]
    pub latex_post: String,
    #[serde(default)]
    pub req: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl NoteType {
    pub fn new(id: impl Into<WideInt>, name: impl Into<String>, kind: NoteTypeKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            modified: UtcDateTime::now().unix_timestamp(),
            usn: -1,
            sortf: 0,
            did: None,
            tmpls: Vec::new(),
            flds: Vec::new(),
            css: DEFAULT_CSS.to_string(),
            latex_pre: DEFAULT_LATEX_PRE.to_string(),
            latex_post: DEFAULT_LATEX_POST.to_string(),
            req: Value::Array(Vec::new()),
            extra: Map::new(),
        }
    }

    /// The id as stored in `notes.mid`.
    pub fn mid(&self) -> Result<i64> {
        i64::try_from(&self.id).or_raise(|| ErrorKind::InvalidData("note type id"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ord: u32,
    #[serde(default)]
    pub sticky: bool,
    #[serde(default)]
    pub rtl: bool,
    #[serde(default = "Field::default_font")]
    pub font: String,
    #[serde(default = "Field::default_size")]
    pub size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<WideInt>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl Field {
    pub fn new(name: impl Into<String>, ord: u32) -> Self {
        Self {
            name: name.into(),
            ord,
            sticky: false,
            rtl: false,
            font: Self::default_font(),
            size: Self::default_size(),
            id: None,
            extra: Map::new(),
        }
    }

    fn default_font() -> String {
        "Arial".to_string()
    }

    fn default_size() -> u32 {
        20
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub ord: u32,
    pub qfmt: String,
    pub afmt: String,
    #[serde(default)]
    pub bqfmt: String,
    #[serde(default)]
    pub bafmt: String,
    #[serde(default)]
    pub did: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<WideInt>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl Template {
    pub fn new(name: impl Into<String>, ord: u32, qfmt: impl Into<String>, afmt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ord,
            qfmt: qfmt.into(),
            afmt: afmt.into(),
            bqfmt: String::new(),
            bafmt: String::new(),
            did: None,
            id: None,
            extra: Map::new(),
        }
    }
}

/// An entry of the `decks` registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(rename = "mod", default)]
    pub modified: i64,
    #[serde(default)]
    pub usn: i64,
    #[serde(rename = "dyn", default)]
    pub dynamic: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl Deck {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        let extra = json!({
            "collapsed": false,
            "browserCollapsed": false,
            "extendNew": 0,
            "extendRev": 0,
            "newToday": [0, 0],
            "revToday": [0, 0],
            "lrnToday": [0, 0],
            "timeToday": [0, 0],
        });
        Self {
            id,
            name: name.into(),
            desc: String::new(),
            modified: timestamp_millis(UtcDateTime::now()) / 1000,
            usn: -1,
            dynamic: 0,
            conf: Some(DEFAULT_DECK_CONFIG_ID),
            extra: match extra {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }
}

/// An entry of the `dconf` registry. Scheduler settings are opaque here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckConfig {
    pub id: i64,
    pub name: String,
    #[serde(rename = "mod", default)]
    pub modified: i64,
    #[serde(default)]
    pub usn: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl DeckConfig {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        let extra = json!({
            "maxTaken": 60,
            "autoplay": true,
            "timer": 0,
            "replayq": true,
            "dyn": false,
            "new": {
                "delays": [1, 10],
                "ints": [1, 4, 0],
                "initialFactor": 2500,
                "order": 1,
                "perDay": 20,
                "bury": false,
            },
            "rev": {
                "perDay": 200,
                "ease4": 1.3,
                "ivlFct": 1,
                "maxIvl": 36500,
                "bury": false,
                "hardFactor": 1.2,
            },
            "lapse": {
                "delays": [10],
                "mult": 0,
                "minInt": 1,
                "leechFails": 8,
                "leechAction": 1,
            },
        });
        Self {
            id,
            name: name.into(),
            modified: 0,
            usn: 0,
            extra: match extra {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }
}

/// The `col` row as stored, JSON documents still serialized.
#[derive(sqlx::FromRow)]
pub(crate) struct CollectionRow {
    pub(crate) id: i64,
    pub(crate) crt: i64,
    #[sqlx(rename = "mod")]
    pub(crate) modified: i64,
    pub(crate) scm: i64,
    pub(crate) ver: i64,
    pub(crate) dty: i64,
    pub(crate) usn: i64,
    pub(crate) ls: i64,
    pub(crate) conf: String,
    pub(crate) models: String,
    pub(crate) decks: String,
    pub(crate) dconf: String,
    pub(crate) tags: String,
}
impl TryFrom<&Collection> for CollectionRow {
    type Error = Error;
    fn try_from(col: &Collection) -> std::result::Result<Self, Self::Error> {
        let models = col.models.iter().map(|(id, model)| (id.to_string(), model)).collect::<BTreeMap<_, _>>();
        Ok(Self {
            id: 1,
            crt: col.crt,
            modified: col.modified,
            scm: col.scm,
            ver: col.ver,
            dty: col.dty,
            usn: col.usn,
            ls: col.ls,
            conf: serde_json::to_string(&col.conf).or_raise(|| ErrorKind::InvalidData("conf"))?,
            models: deckhand_widejson::to_string(&models).or_raise(|| ErrorKind::InvalidData("models"))?,
            decks: serde_json::to_string(&col.decks).or_raise(|| ErrorKind::InvalidData("decks"))?,
            dconf: serde_json::to_string(&col.dconf).or_raise(|| ErrorKind::InvalidData("dconf"))?,
            tags: serde_json::to_string(&col.tags).or_raise(|| ErrorKind::InvalidData("tags"))?,
        })
    }
}
impl TryFrom<CollectionRow> for Collection {
    type Error = Error;
    fn try_from(row: CollectionRow) -> std::result::Result<Self, Self::Error> {
        let codec = WideJson::new(MODEL_ID_PATHS).or_raise(|| ErrorKind::InvalidData("models"))?;
        let models: BTreeMap<String, NoteType> =
            codec.parse(&row.models).or_raise(|| ErrorKind::InvalidData("models"))?;
        let models = models
            .into_values()
            .map(|model| Ok((model.mid()?, model)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self {
            crt: row.crt,
            modified: row.modified,
            scm: row.scm,
            ver: row.ver,
            dty: row.dty,
            usn: row.usn,
            ls: row.ls,
            conf: serde_json::from_str(&row.conf).or_raise(|| ErrorKind::InvalidData("conf"))?,
            models,
            decks: serde_json::from_str(&row.decks).or_raise(|| ErrorKind::InvalidData("decks"))?,
            dconf: serde_json::from_str(&row.dconf).or_raise(|| ErrorKind::InvalidData("dconf"))?,
            tags: serde_json::from_str(&row.tags).or_raise(|| ErrorKind::InvalidData("tags"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloze_model(id: &str) -> NoteType {
        let mut field = Field::new("Text", 0);
        field.id = Some("-7123456789012345678".parse().unwrap());
        let mut template = Template::new("Cloze", 0, "{{cloze:Text}}", "{{cloze:Text}}");
        template.id = Some("170141183460469231731687303715884105727".parse().unwrap());
        NoteType {
            id: id.parse().unwrap(),
            name: "Cloze".to_string(),
            kind: NoteTypeKind::Cloze,
            modified: 0,
            usn: -1,
            sortf: 0,
            did: None,
            tmpls: vec![template],
            flds: vec![field],
            css: ".card {}".to_string(),
            latex_pre: String::new(),
            latex_post: String::new(),
            req: Value::Null,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_default_collection_has_default_deck() {
        let col = Collection::default();
        assert_eq!(col.decks[&DEFAULT_DECK_ID].name, "Default");
        assert_eq!(col.dconf[&DEFAULT_DECK_CONFIG_ID].name, "Default");
        assert!(col.models.is_empty());
        assert_eq!(col.ver, SCHEMA_VERSION);
    }

    #[test]
    fn test_models_keep_wide_ids() {
        let mut col = Collection::default();
        let model = cloze_model("9007199254740993");
        col.models.insert(model.mid().unwrap(), model.clone());
        let row = CollectionRow::try_from(&col).unwrap();
        assert!(row.models.contains("170141183460469231731687303715884105727"));
        let restored = Collection::try_from(row).unwrap();
        assert_eq!(restored.models[&9007199254740993], model);
        assert_eq!(restored, col);
    }

    #[test]
    fn test_unknown_keys_survive() {
        let text = r#"{"1": {"id": 1, "name": "Default", "desc": "", "mod": 0, "usn": 0, "dyn": 0, "conf": 1, "mystery": [1, 2]}}"#;
        let decks: BTreeMap<i64, Deck> = serde_json::from_str(text).unwrap();
        assert_eq!(decks[&1].extra["mystery"], json!([1, 2]));
        let again = serde_json::to_string(&decks).unwrap();
        assert!(again.contains(r#""mystery":[1,2]"#));
    }
}
