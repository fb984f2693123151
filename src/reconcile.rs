//! Reconciliation driver.
//!
//! Decides, per incoming candidate, whether to insert a new distillery, patch
//! the matching stored one, or skip it. Matching and merge decisions are pure;
//! writes happen only in [`run`], and only when not in dry-run mode.
//!
//! Flow:
//! 1. drop blank names, collapse duplicates on (token signature, country)
//! 2. build the match index over stored records
//! 3. per candidate: exact name → signature → bucketed fuzzy
//! 4. no match → pending insert; match → field changes via the merge table
//! 5. commit unless dry run, then report

use anyhow::Result;
use rustc_hash::{FxHashMap, FxHashSet};
use std::time::Instant;

use crate::index::{IndexKeys, MatchIndex};
use crate::log_only;
use crate::merge::compute_changes;
use crate::models::{
    CandidateRecord, CoordinateReason, DistilleryRecord, ExistingRecord, MatchKind, Patch,
    ReconcileConfig, ReconcileOutcome, ReconcileStats, SkippedCandidate,
};
use crate::normalize::{normalize, token_signature};
use crate::progress::{finish_phase, log_progress, phase_bar, Phase};
use crate::store::DistilleryStore;

/// Key under which dataset rows are considered the same distillery.
/// Two distinct distilleries whose tokens sort identically in the same
/// country collapse; curated datasets rely on this.
pub fn dedupe_key(candidate: &CandidateRecord) -> (String, String) {
    (token_signature(&candidate.name), normalize(&candidate.country))
}

/// Keep the first candidate per [`dedupe_key`]. Returns survivors in input
/// order and the number dropped.
pub fn dedupe_candidates(candidates: Vec<CandidateRecord>) -> (Vec<CandidateRecord>, usize) {
    let mut seen: FxHashSet<(String, String)> = FxHashSet::default();
    let total = candidates.len();
    let kept: Vec<CandidateRecord> = candidates
        .into_iter()
        .filter(|c| seen.insert(dedupe_key(c)))
        .collect();
    let dropped = total - kept.len();
    (kept, dropped)
}

#[derive(Debug, Clone, Copy)]
enum SlotKind {
    Existing { id: i64 },
    Pending { insert: usize },
}

/// Working copy of one record the index can point at.
struct Slot {
    kind: SlotKind,
    record: DistilleryRecord,
}

/// Match every candidate against `existing` and decide inserts, patches and
/// skips. Performs no I/O; `config.dry_run` does not affect the result.
pub fn reconcile(
    candidates: Vec<CandidateRecord>,
    existing: &[ExistingRecord],
    config: &ReconcileConfig,
) -> Result<ReconcileOutcome> {
    config.validate()?;
    let start = Instant::now();

    let mut stats = ReconcileStats {
        existing_total: existing.len(),
        candidates_total: candidates.len(),
        ..ReconcileStats::default()
    };

    let (valid, invalid): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|c| !c.name.trim().is_empty());
    stats.candidates_invalid = invalid.len();

    let (unique, duplicates) = dedupe_candidates(valid);
    stats.candidates_duplicate = duplicates;

    let mut index = MatchIndex::build(existing);
    let mut slots: Vec<Slot> = existing
        .iter()
        .map(|e| Slot {
            kind: SlotKind::Existing { id: e.id },
            record: e.record.clone(),
        })
        .collect();

    let mut inserts: Vec<DistilleryRecord> = Vec::new();
    let mut patches: Vec<Patch> = Vec::new();
    let mut patch_by_slot: FxHashMap<usize, usize> = FxHashMap::default();
    let mut skipped: Vec<SkippedCandidate> = Vec::new();

    let total = unique.len() as u64;
    let pb = phase_bar(Phase::Match, total);

    for (i, candidate) in unique.into_iter().enumerate() {
        let keys = IndexKeys::of(&candidate.name);

        match index.lookup(&keys, config.similarity_threshold) {
            None => {
                let record = candidate.into_insert();
                let slot = slots.len();
                slots.push(Slot {
                    kind: SlotKind::Pending {
                        insert: inserts.len(),
                    },
                    record: record.clone(),
                });
                inserts.push(record);
                index.insert(slot, keys);
                stats.inserted += 1;
            }
            Some((slot, matched_by)) => {
                match matched_by {
                    MatchKind::ExactName => stats.matched_exact += 1,
                    MatchKind::Signature => stats.matched_signature += 1,
                    MatchKind::Fuzzy { .. } => stats.matched_fuzzy += 1,
                }

                let changes = compute_changes(&slots[slot].record, &candidate, config);

                let kind = slots[slot].kind;
                match kind {
                    SlotKind::Pending { insert } => {
                        changes.apply_to(&mut slots[slot].record);
                        changes.apply_to(&mut inserts[insert]);
                        stats.merged_into_insert += 1;
                    }
                    SlotKind::Existing { id } if changes.is_empty() => {
                        skipped.push(SkippedCandidate {
                            candidate_name: candidate.name,
                            target_id: id,
                            target_name: slots[slot].record.name.clone(),
                            matched_by,
                        });
                        stats.skipped_no_change += 1;
                    }
                    SlotKind::Existing { id } => {
                        changes.apply_to(&mut slots[slot].record);
                        match patch_by_slot.get(&slot).copied() {
                            Some(p) => patches[p].changes.absorb(changes),
                            None => {
                                patch_by_slot.insert(slot, patches.len());
                                patches.push(Patch {
                                    target_id: id,
                                    target_name: slots[slot].record.name.clone(),
                                    matched_by,
                                    changes,
                                });
                            }
                        }
                    }
                }
            }
        }

        pb.inc(1);
        log_progress(Phase::Match, i as u64 + 1, total);
    }

    stats.updated = patches.len();
    for patch in &patches {
        match patch.changes.coordinates.map(|c| c.reason) {
            Some(CoordinateReason::Filled) => stats.coordinates_filled += 1,
            Some(_) => stats.coordinates_corrected += 1,
            None => {}
        }
    }
    stats.elapsed_seconds = start.elapsed().as_secs_f64();

    finish_phase(
        &pb,
        Phase::Match,
        format!(
            "Phase 2: {} to insert, {} to update, {} unchanged",
            stats.inserted, stats.updated, stats.skipped_no_change
        ),
    );

    Ok(ReconcileOutcome {
        config: *config,
        stats,
        inserts,
        patches,
        skipped,
    })
}

/// Full pipeline against a store: load, reconcile, and commit unless dry run.
pub fn run(
    store: &mut DistilleryStore,
    candidates: Vec<CandidateRecord>,
    config: &ReconcileConfig,
) -> Result<ReconcileOutcome> {
    config.validate()?;

    let existing = store.load_all()?;
    let outcome = reconcile(candidates, &existing, config)?;

    if config.dry_run {
        log_only!("[COMMIT] Dry run, no changes written");
    } else {
        store.commit(&outcome)?;
    }

    Ok(outcome)
}
