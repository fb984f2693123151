//! In-memory match index over stored distillery names.
//!
//! Three lookups built once per run, checked cheapest first:
//! - exact normalized name → slot
//! - token signature → slot
//! - first-letter bucket → slots, scanned with the fuzzy matcher
//!
//! Slots are positions in the caller's working set. The index never owns
//! records, so the driver can register pending inserts as it goes.

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::models::{ExistingRecord, MatchKind};
use crate::normalize::{compact, normalize, token_signature};
use crate::similarity::compact_similarity;

/// Bucket for names that normalize to nothing.
pub const FALLBACK_BUCKET: char = '#';

pub type NameIndex = FxHashMap<String, usize>;
pub type SignatureIndex = FxHashMap<String, usize>;
pub type BucketIndex = FxHashMap<char, Vec<BucketEntry>>;

#[derive(Clone, Debug)]
pub struct BucketEntry {
    pub slot: usize,
    pub compact: String,
}

/// All keys derived from one name, computed once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexKeys {
    pub name: String,
    pub signature: String,
    pub bucket: char,
    pub compact: String,
}

impl IndexKeys {
    /// Keys are used as-is even when empty: every stopword-only name shares
    /// the empty key and lands in [`FALLBACK_BUCKET`].
    pub fn of(name: &str) -> Self {
        let normalized = normalize(name);
        let bucket = normalized.chars().next().unwrap_or(FALLBACK_BUCKET);

        Self {
            name: normalized,
            signature: token_signature(name),
            bucket,
            compact: compact(name),
        }
    }
}

#[derive(Default, Debug)]
pub struct MatchIndex {
    names: NameIndex,
    signatures: SignatureIndex,
    buckets: BucketIndex,
}

impl MatchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored records; slot `i` is `existing[i]`.
    /// Duplicate keys resolve last-write-wins.
    pub fn build(existing: &[ExistingRecord]) -> Self {
        let keys: Vec<IndexKeys> = existing
            .par_iter()
            .map(|r| IndexKeys::of(&r.record.name))
            .collect();

        let mut index = Self::new();
        for (slot, k) in keys.into_iter().enumerate() {
            index.insert(slot, k);
        }
        index
    }

    pub fn insert(&mut self, slot: usize, keys: IndexKeys) {
        self.names.insert(keys.name, slot);
        self.signatures.insert(keys.signature, slot);
        self.buckets.entry(keys.bucket).or_default().push(BucketEntry {
            slot,
            compact: keys.compact,
        });
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bucket(&self, bucket: char) -> &[BucketEntry] {
        self.buckets.get(&bucket).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Best fuzzy candidate within the needle's bucket, regardless of threshold.
    /// Ties keep the earliest registered slot.
    pub fn best_in_bucket(&self, keys: &IndexKeys) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for entry in self.bucket(keys.bucket) {
            let score = compact_similarity(&keys.compact, &entry.compact);
            match best {
                Some((_, best_score)) if best_score >= score => {}
                _ => best = Some((entry.slot, score)),
            }
        }
        best
    }

    /// Tiered lookup: exact name, then signature, then bucketed fuzzy match
    /// accepted only at or above `threshold`.
    pub fn lookup(&self, keys: &IndexKeys, threshold: f64) -> Option<(usize, MatchKind)> {
        if let Some(&slot) = self.names.get(&keys.name) {
            return Some((slot, MatchKind::ExactName));
        }
        if let Some(&slot) = self.signatures.get(&keys.signature) {
            return Some((slot, MatchKind::Signature));
        }
        match self.best_in_bucket(keys) {
            Some((slot, score)) if score >= threshold => Some((slot, MatchKind::Fuzzy { score })),
            _ => None,
        }
    }
}
