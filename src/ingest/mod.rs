// src/ingest/mod.rs
pub mod fetcher;
pub mod parser;
pub mod types;

use once_cell::sync::OnceCell;
use regex::Regex;

/// Maximum number of characters kept from an entry description.
pub const DESCRIPTION_MAX_CHARS: usize = 200;

fn tag_regex() -> &'static Regex {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"))
}

fn ws_regex() -> &'static Regex {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"))
}

/// Plain-text rendering of feed markup: entities decoded, tags removed,
/// whitespace collapsed and trimmed.
pub fn plain_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let stripped = tag_regex().replace_all(&decoded, " ");
    ws_regex().replace_all(&stripped, " ").trim().to_string()
}

/// Description as stored on an [`types::Entry`]: plain text capped at
/// [`DESCRIPTION_MAX_CHARS`] characters, with `...` appended when cut.
pub fn clean_description(s: &str) -> String {
    let text = plain_text(s);
    if text.chars().count() <= DESCRIPTION_MAX_CHARS {
        return text;
    }
    let mut out: String = text.chars().take(DESCRIPTION_MAX_CHARS).collect();
    out.push_str("...");
    out
}
