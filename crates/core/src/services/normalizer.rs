//! Search token extraction for post content.
//!
//! Both extractors are pure functions of the text. The result replaces the
//! stored set on every write, so an edit that drops a tag drops it from the
//! index too.

use std::collections::BTreeSet;

use regex::Regex;

// Regex patterns - these are valid static patterns that cannot fail
#[allow(clippy::unwrap_used)]
static HASHTAG_RE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"(?:^|[^\p{L}\p{N}_])#([\p{L}\p{N}_]+)").unwrap());

/// Shortest keyword kept, in characters.
const MIN_KEYWORD_CHARS: usize = 3;

/// Hashtags and keywords derived from one piece of content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTokens {
    /// Lowercase hashtags without `#`.
    pub hashtags: BTreeSet<String>,
    /// Lowercase search keywords.
    pub keywords: BTreeSet<String>,
}

impl ContentTokens {
    /// Run both extractors over `text`.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        Self {
            hashtags: extract_hashtags(text),
            keywords: extract_keywords(text),
        }
    }

    /// Hashtags as a JSON array column value.
    #[must_use]
    pub fn hashtags_json(&self) -> serde_json::Value {
        to_json_array(&self.hashtags)
    }

    /// Keywords as a JSON array column value.
    #[must_use]
    pub fn keywords_json(&self) -> serde_json::Value {
        to_json_array(&self.keywords)
    }
}

/// Distinct lowercase `#tag` tokens.
///
/// A tag is a run of letters, digits and underscores after a `#` that is not
/// itself preceded by one of those characters, so `a#b` is not a tag while
/// `(#b)` and `x,#b` are.
#[must_use]
pub fn extract_hashtags(text: &str) -> BTreeSet<String> {
    HASHTAG_RE
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Distinct lowercase keywords.
///
/// Whitespace-split tokens with punctuation removed, kept when longer than
/// two characters and not made of digits only.
#[must_use]
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    text.split_whitespace()
        .map(|token| {
            token
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|token| token.chars().count() >= MIN_KEYWORD_CHARS)
        .filter(|token| !token.chars().all(|c| c.is_numeric()))
        .collect()
}

fn to_json_array(set: &BTreeSet<String>) -> serde_json::Value {
    serde_json::Value::Array(
        set.iter()
            .map(|s| serde_json::Value::String(s.clone()))
            .collect(),
    )
}
