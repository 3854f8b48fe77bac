//! Small text utilities shared by the matcher, aggregator and synthesizers.
//!
//! All lookups expect already-lowercased input.

/// Characters that continue a word for boundary checks.
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn starts_at_boundary(haystack: &str, idx: usize) -> bool {
    haystack[..idx]
        .chars()
        .next_back()
        .map_or(true, |c| !is_word_char(c))
}

fn ends_at_boundary(haystack: &str, end: usize) -> bool {
    haystack[end..]
        .chars()
        .next()
        .map_or(true, |c| !is_word_char(c))
}

/// Whole word or phrase containment (`"auth"` matches `"auth service"`,
/// not `"author"`).
pub fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    haystack.match_indices(term).any(|(idx, _)| {
        starts_at_boundary(haystack, idx) && ends_at_boundary(haystack, idx + term.len())
    })
}

/// Containment anchored at a word start (`"test"` matches `"tests"` and
/// `"testing"`, not `"latest"`).
pub fn contains_word_prefix(haystack: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return false;
    }
    haystack
        .match_indices(prefix)
        .any(|(idx, _)| starts_at_boundary(haystack, idx))
}

/// Largest char boundary `<= idx`.
pub fn floor_char_boundary(s: &str, idx: usize) -> usize {
    let mut idx = idx.min(s.len());
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Smallest char boundary `>= idx`.
pub fn ceil_char_boundary(s: &str, idx: usize) -> usize {
    let mut idx = idx.min(s.len());
    while !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Uppercase the first character.
pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

const TRAILING_JUNK: &[char] = &[',', ';', ':', '-', '(', ' ', '\t', '\n'];

/// Bound `s` to `max_chars` characters.
///
/// Cuts at the last word boundary that fits; when there is none, hard-cuts
/// and appends `...` (the ellipsis counts toward the limit).
pub fn truncate_to_length(s: &str, max_chars: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }

    let prefix: String = s.chars().take(max_chars).collect();
    let next_is_space = s
        .chars()
        .nth(max_chars)
        .map_or(true, char::is_whitespace);

    let word_cut = if next_is_space {
        Some(prefix.as_str())
    } else {
        prefix.rfind(char::is_whitespace).map(|idx| &prefix[..idx])
    };

    if let Some(cut) = word_cut {
        let cut = cut.trim_end_matches(TRAILING_JUNK);
        if !cut.is_empty() {
            return cut.to_string();
        }
    }

    if max_chars <= 3 {
        return s.chars().take(max_chars).collect();
    }
    let mut out: String = s.chars().take(max_chars - 3).collect();
    out.push_str("...");
    out
}

/// Split into sentences on `.`, `!`, `?` and newlines.
pub fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c| matches!(c, '.' | '!' | '?' | '\n'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Append-then-deduplicate, preserving first-seen order.
pub fn dedup_preserving_order(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}
