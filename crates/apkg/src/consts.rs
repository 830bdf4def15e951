use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// The `src` attribute of tags embedding a media file, double-quoted,
// single-quoted or bare.
regex!(
    MEDIA_SRC_REGEX,
    r#"(?i)<(?:img|audio|video|source|embed)\b[^>]*?\ssrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#
);
regex!(SOUND_REGEX, r"\[sound:([^\]]+)\]");
// {{c1::content}} or {{c1::content::hint}}
regex!(CLOZE_REGEX, r"(?s)\{\{c(\d+)::(.*?)(?:::(.*?))?\}\}");
// The field a cloze template reads its deletions from: {{cloze:Text}}
regex!(CLOZE_FIELD_REGEX, r"\{\{cloze:([^}]+)\}\}");
regex!(HTML_TAG_REGEX, r"(?s)<[^>]*>");
