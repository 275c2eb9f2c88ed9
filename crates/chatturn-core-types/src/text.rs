use std::fmt;

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

const CURSOR_GLYPHS: [char; 3] = ['\u{258D}', '\u{258B}', '\u{258C}'];

/// Collapses whitespace runs (non-breaking spaces included) into one space and trims.
pub fn normalize_for_compare(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// [`normalize_for_compare`] plus removal of trailing typing-cursor glyphs.
pub fn normalize_assistant_text(text: &str) -> String {
    let normalized = normalize_for_compare(text);
    normalized
        .trim_end_matches(|c: char| CURSOR_GLYPHS.contains(&c) || c.is_whitespace())
        .to_string()
}

/// Hash of normalized text. "No content" is its own variant, never a digest.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ContentHash {
    Empty,
    Sha256(String),
}

impl ContentHash {
    pub fn is_empty(&self) -> bool {
        matches!(self, ContentHash::Empty)
    }

    /// Hex digest, or `""` for [`ContentHash::Empty`].
    pub fn as_str(&self) -> &str {
        match self {
            ContentHash::Empty => "",
            ContentHash::Sha256(hex) => hex,
        }
    }

    pub fn prefix(&self, len: usize) -> Option<&str> {
        match self {
            ContentHash::Empty => None,
            ContentHash::Sha256(hex) => Some(&hex[..len.min(hex.len())]),
        }
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentHash::Empty => f.write_str("none"),
            ContentHash::Sha256(hex) => f.write_str(hex),
        }
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ContentHash::Empty => serializer.serialize_none(),
            ContentHash::Sha256(hex) => serializer.serialize_str(hex),
        }
    }
}

pub fn stable_hash(text: &str) -> ContentHash {
    let normalized = normalize_for_compare(text);
    if normalized.is_empty() {
        return ContentHash::Empty;
    }
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    ContentHash::Sha256(hex::encode(hasher.finalize()))
}

/// Exact equality of normalized forms. Empty on either side never matches.
pub fn prompt_echo_matches(prompt: &str, observed_user_text: &str) -> bool {
    let prompt = normalize_for_compare(prompt);
    let observed = normalize_for_compare(observed_user_text);
    !prompt.is_empty() && !observed.is_empty() && prompt == observed
}

/// Last `max_chars` characters of `text`.
pub fn tail_chars(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max_chars)).collect()
}
