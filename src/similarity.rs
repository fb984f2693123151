//! Fuzzy name similarity.
//!
//! Bigram Dice coefficient over normalized, whitespace-free names. Bigram
//! occurrences are matched one-to-one, so repeated bigrams count as a multiset
//! ("aaaa" vs "aa" is 0.5, not 1.0).

use crate::normalize::compact;

/// Similarity of two names in [0, 1].
///
/// Both names are normalized and compacted first. Empty → 0, identical → 1,
/// shorter than two characters → 0.
pub fn similarity(a: &str, b: &str) -> f64 {
    compact_similarity(&compact(a), &compact(b))
}

/// Dice coefficient on already-compacted names.
/// Used by the match index, which compacts stored names once per run.
pub fn compact_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    // Compacted names are ASCII, so byte length equals bigram-relevant length
    strsim::sorensen_dice(a, b)
}

/// Best-scoring candidate for `needle`. Ties keep the first occurrence.
/// Returns None only for an empty candidate list.
pub fn best_match<T, S, I>(needle: &str, candidates: I) -> Option<(T, f64)>
where
    I: IntoIterator<Item = (T, S)>,
    S: AsRef<str>,
{
    let needle = compact(needle);
    let mut best: Option<(T, f64)> = None;

    for (value, text) in candidates {
        let score = compact_similarity(&needle, &compact(text.as_ref()));
        match &best {
            Some((_, best_score)) if *best_score >= score => {}
            _ => best = Some((value, score)),
        }
    }

    best
}
