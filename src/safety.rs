//! Safety checks for files the tool writes.
//!
//! The only file written besides the catalogue is the optional JSON report.
//! A mistyped flag must never point it at the catalogue or the dataset.

use anyhow::{bail, Result};
use std::path::Path;

/// Validates that a report path is safe to overwrite.
///
/// Checks:
/// - Report filename must end in `.json`
/// - Report cannot be the same as any of the provided source paths
pub fn validate_report_path(report: &Path, source_paths: &[&Path]) -> Result<()> {
    let is_json = report
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if !is_json {
        bail!(
            "Safety check failed: report file '{}' must have a .json extension",
            report.display()
        );
    }

    for source in source_paths {
        if same_file(report, source) {
            bail!(
                "Safety check failed: report '{}' cannot be the same as source '{}'",
                report.display(),
                source.display()
            );
        }
    }

    Ok(())
}

/// Compare canonical paths when both exist, otherwise the paths as given.
fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
