//! Small text helpers shared by planning, search and validation.

use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

/// Minimum number of characters a token needs to count as a keyword.
const MIN_KEYWORD_CHARS: usize = 4;

/// Split text into keyword tokens longer than three characters.
///
/// Tokens keep their original spelling; duplicates are removed
/// case-insensitively, keeping the first occurrence.
pub fn keyword_tokens(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= MIN_KEYWORD_CHARS)
        .filter(|token| seen.insert(token.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Truncate to at most `max` grapheme clusters, appending "..." when cut.
pub fn truncate_graphemes(text: &str, max: usize) -> String {
    if text.graphemes(true).count() <= max {
        return text.to_string();
    }
    let kept: String = text.graphemes(true).take(max.saturating_sub(3)).collect();
    format!("{}...", kept.trim_end())
}

/// Length of `text` in grapheme clusters.
pub fn grapheme_len(text: &str) -> usize {
    text.graphemes(true).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_tokens() {
        let tokens = keyword_tokens("Was ist ein Bilanzkreis? Bilanzkreis-Verantwortlicher!");
        assert_eq!(tokens, vec!["Bilanzkreis", "Verantwortlicher"]);
    }

    #[test]
    fn test_keyword_tokens_umlauts() {
        let tokens = keyword_tokens("Übertragungsnetzbetreiber und Lieferanten");
        assert_eq!(tokens, vec!["Übertragungsnetzbetreiber", "Lieferanten"]);
    }

    #[test]
    fn test_truncate_graphemes() {
        assert_eq!(truncate_graphemes("short", 10), "short");
        let cut = truncate_graphemes("abcdefghijklmnop", 8);
        assert_eq!(cut, "abcde...");
        assert_eq!(grapheme_len(&cut), 8);
    }
}
