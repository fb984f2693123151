//! Show how a name would be matched against the catalogue.
//! Usage: cargo run --release --bin match-probe -- <database> "<name>" [--top N]
//!
//! Prints the normalized keys, the tiered matcher's decision, and the closest
//! catalogue names across all buckets. Useful when tuning the threshold.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use distillery_reconcile::index::{IndexKeys, MatchIndex};
use distillery_reconcile::models::{MatchKind, ReconcileConfig, DEFAULT_SIMILARITY_THRESHOLD};
use distillery_reconcile::normalize::{normalize, token_signature};
use distillery_reconcile::similarity::{best_match, similarity};
use distillery_reconcile::store::DistilleryStore;

#[derive(Parser)]
#[command(name = "match-probe")]
#[command(about = "Explain how a distillery name matches the catalogue")]
struct Args {
    /// Existing catalogue SQLite database (opened read-only)
    database: PathBuf,

    /// Distillery name to look up
    name: String,

    /// Number of closest names to list
    #[arg(long, default_value = "10")]
    top: usize,

    /// Minimum fuzzy score in (0, 1] to accept a match
    #[arg(long, default_value_t = DEFAULT_SIMILARITY_THRESHOLD)]
    similarity_threshold: f64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    ReconcileConfig {
        similarity_threshold: args.similarity_threshold,
        ..ReconcileConfig::default()
    }
    .validate()?;

    let store = DistilleryStore::open_read_only(&args.database)?;
    let existing = store.load_all()?;
    let index = MatchIndex::build(&existing);
    let keys = IndexKeys::of(&args.name);

    println!("Name:       {}", args.name);
    println!("Normalized: {:?}", normalize(&args.name));
    println!("Signature:  {:?}", token_signature(&args.name));
    println!(
        "Bucket:     '{}' ({} catalogue names)",
        keys.bucket,
        index.bucket(keys.bucket).len()
    );
    println!("{:-<80}", "");

    match index.lookup(&keys, args.similarity_threshold) {
        Some((slot, kind)) => {
            let target = &existing[slot];
            let how = match kind {
                MatchKind::ExactName => "exact name".to_string(),
                MatchKind::Signature => "token signature".to_string(),
                MatchKind::Fuzzy { score } => format!("fuzzy, score {:.4}", score),
            };
            println!("Decision: PATCH [{}] {} ({})", target.id, target.record.name, how);
        }
        None => {
            let near = index
                .best_in_bucket(&keys)
                .map(|(slot, score)| format!(" (best in bucket: {} at {:.4})", existing[slot].record.name, score))
                .unwrap_or_default();
            println!(
                "Decision: INSERT, nothing at or above {:.2}{}",
                args.similarity_threshold, near
            );
        }
    }

    if let Some((id, score)) = best_match(
        &args.name,
        existing.iter().map(|e| (e.id, e.record.name.as_str())),
    ) {
        println!("Best across all buckets: id {} at {:.4}", id, score);
    }

    let mut scored: Vec<(f64, &str, i64)> = existing
        .iter()
        .map(|e| (similarity(&args.name, &e.record.name), e.record.name.as_str(), e.id))
        .filter(|(score, _, _)| *score > 0.0)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    println!("\nClosest catalogue names:");
    println!("{:-<80}", "");
    if scored.is_empty() {
        println!("No similar names found.");
    }
    for (score, name, id) in scored.into_iter().take(args.top) {
        let marker = if score >= args.similarity_threshold { "*" } else { " " };
        println!("{} {:.4}  [{}] {}", marker, score, id, name);
    }

    Ok(())
}
