//! Wake keyword matching
//!
//! Case-insensitive substring and word-boundary matching over
//! transcripts, plus wake-word stripping to recover the command that
//! follows the trigger phrase.

/// A single keyword with its boundary rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSpec {
    /// The phrase to match
    pub phrase: String,
    /// Require non-alphanumeric neighbours around the match
    pub require_boundary: bool,
}

impl KeywordSpec {
    /// Create a keyword, normalizing surrounding whitespace
    #[must_use]
    pub fn new(phrase: &str, require_boundary: bool) -> Self {
        Self {
            phrase: phrase.trim().to_string(),
            require_boundary,
        }
    }
}

/// Primary wake keyword plus ordered alternates
///
/// Each entry carries an independent boundary rule; matching is
/// first-match-wins in declaration order, primary first.
#[derive(Debug, Clone)]
pub struct KeywordSet {
    /// The primary wake keyword
    pub primary: KeywordSpec,
    /// Ordered alternate keywords
    pub alternates: Vec<KeywordSpec>,
}

impl KeywordSet {
    /// Create a set from a primary keyword and alternates
    #[must_use]
    pub const fn new(primary: KeywordSpec, alternates: Vec<KeywordSpec>) -> Self {
        Self {
            primary,
            alternates,
        }
    }

    /// All keywords in match order
    pub fn iter(&self) -> impl Iterator<Item = &KeywordSpec> {
        std::iter::once(&self.primary).chain(self.alternates.iter())
    }

    /// First keyword matching `text`, if any
    #[must_use]
    pub fn matched(&self, text: &str) -> Option<&KeywordSpec> {
        self.iter()
            .find(|spec| contains_keyword(text, &spec.phrase, spec.require_boundary))
    }

    /// Whether any keyword matches `text`
    #[must_use]
    pub fn contains_any(&self, text: &str) -> bool {
        self.matched(text).is_some()
    }
}

/// Case-insensitive substring search with an optional boundary rule
///
/// With `require_boundary`, the characters immediately before and after
/// the match (or the string edges) must not be alphanumeric.
#[must_use]
pub fn contains_keyword(text: &str, keyword: &str, require_boundary: bool) -> bool {
    if keyword.is_empty() {
        return false;
    }

    let text_lower = text.to_lowercase();
    let keyword_lower = keyword.to_lowercase();

    for (idx, matched) in text_lower.match_indices(&keyword_lower) {
        if !require_boundary {
            return true;
        }

        let before_ok = text_lower[..idx]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = text_lower[idx + matched.len()..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());

        if before_ok && after_ok {
            return true;
        }
    }

    false
}

/// Boundary-aware prefix check after trimming leading whitespace
///
/// Used to detect a wake phrase at utterance start.
#[must_use]
pub fn starts_with_keyword(text: &str, keyword: &str) -> bool {
    if keyword.is_empty() {
        return false;
    }

    let trimmed = text.trim_start();
    match strip_prefix_ci(trimmed, keyword) {
        Some(rest) => rest.chars().next().is_none_or(|c| !c.is_alphanumeric()),
        None => false,
    }
}

/// Remainder of `text` after a leading wake word
///
/// Trimmed, with at most one leading filler punctuation character
/// (`, . ! ?`) stripped. Returns `text` unchanged when the wake word is
/// not a prefix.
#[must_use]
pub fn extract_command_after_wake_word(text: &str, wake_word: &str) -> String {
    if !starts_with_keyword(text, wake_word) {
        return text.to_string();
    }

    let trimmed = text.trim_start();
    let Some(rest) = strip_prefix_ci(trimmed, wake_word) else {
        return text.to_string();
    };

    let mut rest = rest.trim();
    if let Some(first) = rest.chars().next()
        && matches!(first, ',' | '.' | '!' | '?')
    {
        rest = rest[first.len_utf8()..].trim_start();
    }

    rest.trim().to_string()
}

/// Strip `prefix` from the start of `text`, case-insensitively
///
/// Returns the remainder of `text` (original casing) on a match.
fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut consumed = 0;
    let mut chars = text.chars();

    for expected in prefix.chars() {
        let actual = chars.next()?;
        if actual.to_lowercase().ne(expected.to_lowercase()) {
            return None;
        }
        consumed += actual.len_utf8();
    }

    Some(&text[consumed..])
}
