//! Name normalization for distillery matching.
//! Used by the reconciliation driver, the match index and the match-probe binary.
//!
//! CRITICAL: Index keys are derived from these functions. Changing them changes
//! which stored records a candidate collides with. Run tests after changes.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// PATTERNS AND STOPWORDS
// ============================================================================

/// Anything that is not a lowercase ASCII letter or digit (after folding).
pub static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Tokens that carry no identity in a distillery name.
pub static STOPWORDS: Lazy<FxHashSet<&'static str>> = Lazy::new(|| {
    [
        "the",
        "and",
        "&",
        "distillery",
        "distilleries",
        "whisky",
        "whiskey",
        "company",
        "co",
        "ltd",
        "limited",
        "plc",
        "inc",
        "incorporated",
        "llc",
        "sa",
        "srl",
    ]
    .into_iter()
    .collect()
});

/// Separator for token signatures. Cannot survive normalization, so it never
/// appears inside a token.
pub const SIGNATURE_DELIMITER: &str = "|";

// ============================================================================
// FOLDING
// ============================================================================

pub fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036F}' | '\u{1AB0}'..='\u{1AFF}' |
             '\u{1DC0}'..='\u{1DFF}' | '\u{20D0}'..='\u{20FF}' |
             '\u{FE20}'..='\u{FE2F}')
}

/// Strip diacritics and transliterate to lowercase ASCII.
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    // Remaining non-ASCII (ø, ß, Cyrillic, CJK) is transliterated rather than dropped
    any_ascii(&stripped).to_lowercase()
}

// ============================================================================
// TOKENIZATION
// ============================================================================

/// Folded, punctuation-split, stopword-filtered tokens in original order.
pub fn tokens(name: &str) -> Vec<String> {
    let folded = fold_to_ascii(name);
    NON_ALNUM
        .replace_all(&folded, " ")
        .split_whitespace()
        .filter(|t| !STOPWORDS.contains(*t))
        .map(str::to_string)
        .collect()
}

/// Canonical form of a name: surviving tokens joined by single spaces.
/// Empty input yields empty output.
pub fn normalize(name: &str) -> String {
    tokens(name).join(" ")
}

/// Order-independent identity key: tokens sorted and joined with `|`.
/// "Glen Dronach" and "Dronach Glen" share a signature.
pub fn token_signature(name: &str) -> String {
    let mut toks = tokens(name);
    toks.sort_unstable();
    toks.join(SIGNATURE_DELIMITER)
}

/// Normalized name with all whitespace removed, the form bigrams are taken from.
pub fn compact(name: &str) -> String {
    tokens(name).concat()
}

// ============================================================================
// TESTS
// ============================================================================
