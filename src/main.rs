use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

use distillery_reconcile::input::load_candidates;
use distillery_reconcile::models::{
    ReconcileConfig, ReconcileOutcome, DEFAULT_MAX_KEEP_DISTANCE_KM, DEFAULT_SIMILARITY_THRESHOLD,
};
use distillery_reconcile::progress::{finish_phase, format_duration, phase_spinner, set_log_only, Phase};
use distillery_reconcile::reconcile::run;
use distillery_reconcile::safety::validate_report_path;
use distillery_reconcile::store::DistilleryStore;

#[derive(Parser)]
#[command(name = "distillery-reconcile")]
#[command(about = "Merge an external distillery dataset into the catalogue database")]
struct Args {
    /// Catalogue SQLite database (created if missing)
    database: PathBuf,

    /// Candidate dataset (.json array or .csv with a header row)
    input: PathBuf,

    /// Compute and report changes without writing them
    #[arg(long)]
    dry_run: bool,

    /// Minimum fuzzy score in (0, 1] to accept a match
    #[arg(long, default_value_t = DEFAULT_SIMILARITY_THRESHOLD)]
    similarity_threshold: f64,

    /// Stored coordinates closer than this (km) to the candidate's are kept
    #[arg(long, default_value_t = DEFAULT_MAX_KEEP_DISTANCE_KM)]
    max_keep_distance_km: f64,

    /// Always replace stored coordinates with the candidate's
    #[arg(long)]
    force_coordinates: bool,

    /// Write the full decision report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Worker threads for index construction (0 = one per core)
    #[arg(long, default_value = "0")]
    workers: usize,

    /// Disable progress bars, print periodic log lines instead (for background runs)
    #[arg(long)]
    log_only: bool,
}

impl Args {
    fn config(&self) -> ReconcileConfig {
        ReconcileConfig {
            dry_run: self.dry_run,
            similarity_threshold: self.similarity_threshold,
            max_keep_distance_km: self.max_keep_distance_km,
            force_coordinates: self.force_coordinates,
        }
    }
}

fn print_summary(outcome: &ReconcileOutcome, elapsed: std::time::Duration) {
    let stats = &outcome.stats;
    println!("\n{:=<60}", "");
    if outcome.config.dry_run {
        println!("Reconciliation complete (dry run, nothing written)");
    } else {
        println!("Reconciliation complete!");
    }
    println!("  Existing:              {}", stats.existing_total);
    println!(
        "  Candidates:            {} ({} duplicate, {} invalid)",
        stats.candidates_total, stats.candidates_duplicate, stats.candidates_invalid
    );
    println!("  Inserted:              {}", stats.inserted);
    println!("  Updated:               {}", stats.updated);
    println!("  Coordinates filled:    {}", stats.coordinates_filled);
    println!("  Coordinates corrected: {}", stats.coordinates_corrected);
    println!("  Skipped (no change):   {}", stats.skipped_no_change);
    println!("  Elapsed:               {}", format_duration(elapsed));
    println!("{:=<60}", "");
}

fn main() -> Result<()> {
    let args = Args::parse();
    set_log_only(args.log_only);

    let config = args.config();
    config.validate()?;

    if let Some(report) = &args.report {
        validate_report_path(report, &[args.database.as_path(), args.input.as_path()])?;
    }

    if args.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.workers)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    let start = Instant::now();

    let spinner = phase_spinner(Phase::Load);
    let loaded = load_candidates(&args.input)?;
    let mut store = DistilleryStore::open(&args.database)?;
    finish_phase(
        &spinner,
        Phase::Load,
        format!(
            "Phase 1: {} candidates ({} without a name), {} catalogue rows",
            loaded.records.len(),
            loaded.dropped,
            store.count()?
        ),
    );

    let mut outcome = run(&mut store, loaded.records, &config)?;
    outcome.stats.candidates_total += loaded.dropped;
    outcome.stats.candidates_invalid += loaded.dropped;
    outcome.stats.log_phase("reconcile");

    print_summary(&outcome, start.elapsed());

    if let Some(report) = &args.report {
        outcome
            .write_report(report)
            .with_context(|| format!("Failed to write report {}", report.display()))?;
        println!("Report written to {}", report.display());
    }

    Ok(())
}
