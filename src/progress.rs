//! Progress bars and phase logging for reconciliation runs.
//!
//! Each run moves through a fixed set of phases. Interactive runs get an
//! indicatif bar per phase; `--log-only` runs hide the bars and print
//! tail-friendly `[PHASE] n/total` lines to stderr instead.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Global flag for log-only mode (set from args in main)
pub static LOG_ONLY: AtomicBool = AtomicBool::new(false);

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Print to stderr only in log-only mode.
#[macro_export]
macro_rules! log_only {
    ($($arg:tt)*) => {
        if $crate::progress::is_log_only() {
            eprintln!($($arg)*);
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Load,
    Match,
    Commit,
}

impl Phase {
    /// Short tag used in log-only lines
    pub fn tag(self) -> &'static str {
        match self {
            Phase::Load => "LOAD",
            Phase::Match => "MATCH",
            Phase::Commit => "COMMIT",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Load => "Phase 1: Loading catalogue",
            Phase::Match => "Phase 2: Matching candidates",
            Phase::Commit => "Phase 3: Writing changes",
        }
    }
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

/// Progress bar for a phase with a known item count.
pub fn phase_bar(phase: Phase, len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})")
                .unwrap()
                .progress_chars("=> "),
        );
    }
    pb.set_message(phase.label());
    log_only!("[{}] Starting ({} items)", phase.tag(), len);
    pb
}

/// Spinner for a phase of unknown length.
pub fn phase_spinner(phase: Phase) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{msg} {spinner} [{elapsed_precise}]")
                .unwrap(),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
    }
    pb.set_message(phase.label());
    log_only!("[{}] Starting", phase.tag());
    pb
}

/// Logging interval that yields roughly ten lines per phase.
pub fn log_interval(total: u64) -> u64 {
    (total / 10).max(1)
}

/// Log progress periodically in log-only mode.
pub fn log_progress(phase: Phase, current: u64, total: u64) {
    if is_log_only() && total > 0 && (current % log_interval(total) == 0 || current == total) {
        let pct = 100.0 * current as f64 / total as f64;
        eprintln!("[{}] {}/{} ({:.1}%)", phase.tag(), current, total, pct);
    }
}

/// Finish a phase bar with a summary message, mirrored to the log in log-only mode.
pub fn finish_phase(pb: &ProgressBar, phase: Phase, summary: String) {
    log_only!("[{}] {}", phase.tag(), summary);
    pb.finish_with_message(summary);
}
