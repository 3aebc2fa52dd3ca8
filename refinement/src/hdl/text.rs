//! Identifier and comment helpers shared by the HDL checks.

use regex::Regex;
use std::sync::LazyLock;

static BLOCK_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

static LINE_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"//[^\n]*").unwrap());

static MODULE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bmodule\s+([A-Za-z_][A-Za-z0-9_$]*)").unwrap());

/// Characters that may appear inside a Verilog identifier.
pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Remove `/* */` and `//` comments. Block comments become a single space so
/// tokens on either side stay separated.
pub fn strip_comments(source: &str) -> String {
    let without_blocks = BLOCK_COMMENT.replace_all(source, " ");
    LINE_COMMENT.replace_all(&without_blocks, "").into_owned()
}

/// Byte offsets of every whole-word occurrence of `word` in `haystack`.
///
/// An occurrence counts only when it is not preceded or followed by an
/// identifier character, so `en` never matches inside `enable`.
pub fn word_occurrences(haystack: &str, word: &str) -> Vec<usize> {
    if word.is_empty() {
        return Vec::new();
    }
    haystack
        .match_indices(word)
        .filter(|(idx, _)| {
            let before_ok = haystack[..*idx]
                .chars()
                .next_back()
                .map_or(true, |c| !is_ident_char(c));
            let after_ok = haystack[idx + word.len()..]
                .chars()
                .next()
                .map_or(true, |c| !is_ident_char(c));
            before_ok && after_ok
        })
        .map(|(idx, _)| idx)
        .collect()
}

/// First whole-word occurrence of `word`.
pub fn find_word(haystack: &str, word: &str) -> Option<usize> {
    word_occurrences(haystack, word).into_iter().next()
}

/// Name of the first declared module, if any.
pub fn module_name(source: &str) -> Option<String> {
    MODULE_NAME
        .captures(source)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
