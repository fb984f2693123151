//! Core data models for distillery reconciliation.
//!
//! This module contains the record shapes, change sets, configuration and
//! statistics used throughout the reconciliation pipeline.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::geo::haversine_km;

// ============================================================================
// Constants
// ============================================================================

/// Placeholder the catalogue uses for an unknown country or region.
pub const UNKNOWN: &str = "Unknown";

/// Minimum similarity score for a fuzzy match to be accepted.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.92;

/// Coordinates closer than this to the stored ones are left untouched.
pub const DEFAULT_MAX_KEEP_DISTANCE_KM: f64 = 2.0;

// ============================================================================
// Records
// ============================================================================

/// Longitude/latitude pair. Both components are finite; range is not checked.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(into = "[f64; 2]")]
pub struct Coordinates {
    pub lon: f64,
    pub lat: f64,
}

impl Coordinates {
    pub fn new(lon: f64, lat: f64) -> Option<Self> {
        if lon.is_finite() && lat.is_finite() {
            Some(Self { lon, lat })
        } else {
            None
        }
    }
}

impl From<Coordinates> for [f64; 2] {
    fn from(c: Coordinates) -> Self {
        [c.lon, c.lat]
    }
}

/// Distillery record shape shared by incoming candidates and stored rows.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DistilleryRecord {
    pub name: String,
    pub country: String,
    pub region: String,
    pub coordinates: Option<Coordinates>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub founded: Option<u32>,
}

/// Incoming record from an external dataset.
pub type CandidateRecord = DistilleryRecord;

impl DistilleryRecord {
    /// Build a record with only a name. Returns None for a blank name.
    pub fn new(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            ..Self::default()
        })
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = country.trim().to_string();
        self
    }

    pub fn with_region(mut self, region: &str) -> Self {
        self.region = region.trim().to_string();
        self
    }

    pub fn with_coordinates(mut self, lon: f64, lat: f64) -> Self {
        self.coordinates = Coordinates::new(lon, lat);
        self
    }

    pub fn with_website(mut self, website: &str) -> Self {
        self.website = non_blank(website);
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = non_blank(description);
        self
    }

    /// Founding year; zero is treated as absent.
    pub fn with_founded(mut self, year: u32) -> Self {
        self.founded = (year > 0).then_some(year);
        self
    }

    /// Apply the defaults used for brand new catalogue rows.
    pub fn into_insert(mut self) -> Self {
        if self.country.trim().is_empty() {
            self.country = UNKNOWN.to_string();
        }
        if self.region.trim().is_empty() {
            self.region = UNKNOWN.to_string();
        }
        self
    }
}

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Row from the authoritative catalogue.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExistingRecord {
    pub id: i64,
    #[serde(flatten)]
    pub record: DistilleryRecord,
    pub created_at: String,
    pub updated_at: String,
}

// ============================================================================
// Matching and Changes
// ============================================================================

/// Which tier of the matcher produced a match.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchKind {
    ExactName,
    Signature,
    Fuzzy { score: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateReason {
    /// Stored record had no coordinates
    Filled,
    /// Replaced because force mode is on
    Forced,
    /// Replaced because the candidate is beyond the keep distance
    Drifted,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CoordinateChange {
    pub from: Option<Coordinates>,
    pub to: Coordinates,
    pub distance_km: Option<f64>,
    pub reason: CoordinateReason,
}

/// Field-level change set. Only fields that should change are present.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FieldChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub founded: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<CoordinateChange>,
}

impl FieldChanges {
    pub fn is_empty(&self) -> bool {
        self.country.is_none()
            && self.region.is_none()
            && self.website.is_none()
            && self.description.is_none()
            && self.founded.is_none()
            && self.coordinates.is_none()
    }

    pub fn apply_to(&self, record: &mut DistilleryRecord) {
        if let Some(country) = &self.country {
            record.country = country.clone();
        }
        if let Some(region) = &self.region {
            record.region = region.clone();
        }
        if let Some(website) = &self.website {
            record.website = Some(website.clone());
        }
        if let Some(description) = &self.description {
            record.description = Some(description.clone());
        }
        if let Some(founded) = self.founded {
            record.founded = Some(founded);
        }
        if let Some(change) = &self.coordinates {
            record.coordinates = Some(change.to);
        }
    }

    /// Fold a later change set for the same target into this one.
    /// Later values win; a coordinate change keeps the original `from`.
    pub fn absorb(&mut self, later: FieldChanges) {
        if later.country.is_some() {
            self.country = later.country;
        }
        if later.region.is_some() {
            self.region = later.region;
        }
        if later.website.is_some() {
            self.website = later.website;
        }
        if later.description.is_some() {
            self.description = later.description;
        }
        if later.founded.is_some() {
            self.founded = later.founded;
        }
        if let Some(mut change) = later.coordinates {
            if let Some(earlier) = &self.coordinates {
                change.from = earlier.from;
                change.distance_km = earlier.from.map(|from| haversine_km(from, change.to));
                if earlier.reason == CoordinateReason::Filled {
                    change.reason = CoordinateReason::Filled;
                }
            }
            self.coordinates = Some(change);
        }
    }
}

/// Proposed update of one stored record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Patch {
    pub target_id: i64,
    pub target_name: String,
    pub matched_by: MatchKind,
    #[serde(flatten)]
    pub changes: FieldChanges,
}

/// Candidate that matched a stored record but had nothing new to offer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedCandidate {
    pub candidate_name: String,
    pub target_id: i64,
    pub target_name: String,
    pub matched_by: MatchKind,
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ReconcileConfig {
    pub dry_run: bool,
    pub similarity_threshold: f64,
    pub max_keep_distance_km: f64,
    pub force_coordinates: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_keep_distance_km: DEFAULT_MAX_KEEP_DISTANCE_KM,
            force_coordinates: false,
        }
    }
}

impl ReconcileConfig {
    /// Reject out-of-range settings before any record is processed.
    pub fn validate(&self) -> Result<()> {
        // NaN fails both comparisons
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            bail!(
                "Invalid configuration: similarity threshold {} must be in (0, 1]",
                self.similarity_threshold
            );
        }
        if !(self.max_keep_distance_km >= 0.0) || self.max_keep_distance_km.is_infinite() {
            bail!(
                "Invalid configuration: max keep distance {} km must be a finite number >= 0",
                self.max_keep_distance_km
            );
        }
        Ok(())
    }
}

// ============================================================================
// Statistics and Report
// ============================================================================

/// Counters for one reconciliation run.
#[derive(Default, Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileStats {
    pub existing_total: usize,
    pub candidates_total: usize,
    pub candidates_invalid: usize,
    pub candidates_duplicate: usize,

    // Which tier matched
    pub matched_exact: usize,
    pub matched_signature: usize,
    pub matched_fuzzy: usize,

    // Decisions
    pub inserted: usize,
    pub updated: usize,
    pub coordinates_filled: usize,
    pub coordinates_corrected: usize,
    pub skipped_no_change: usize,
    pub merged_into_insert: usize,

    pub elapsed_seconds: f64,
}

impl ReconcileStats {
    /// Log stats to stderr in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            eprintln!("[STATS:{}]\n{}", phase, json);
        }
    }
}

/// Result of a reconciliation run: the proposed writes plus counters.
#[derive(Clone, Debug, Serialize)]
pub struct ReconcileOutcome {
    pub config: ReconcileConfig,
    pub stats: ReconcileStats,
    pub inserts: Vec<DistilleryRecord>,
    pub patches: Vec<Patch>,
    pub skipped: Vec<SkippedCandidate>,
}

impl ReconcileOutcome {
    /// Write the full outcome as a JSON report
    pub fn write_report(&self, path: &std::path::Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_new_rejects_blank_name() {
        assert!(DistilleryRecord::new("").is_none());
        assert!(DistilleryRecord::new("   ").is_none());
        assert_eq!(DistilleryRecord::new("  Ardbeg ").unwrap().name, "Ardbeg");
    }

    #[test]
    fn test_coordinates_reject_non_finite() {
        assert!(Coordinates::new(f64::NAN, 1.0).is_none());
        assert!(Coordinates::new(1.0, f64::INFINITY).is_none());
        // Out of range is accepted
        assert!(Coordinates::new(200.0, 95.0).is_some());
    }

    #[test]
    fn test_into_insert_defaults_unknown() {
        let rec = DistilleryRecord::new("Kilchoman").unwrap().with_region("Islay").into_insert();
        assert_eq!(rec.country, UNKNOWN);
        assert_eq!(rec.region, "Islay");
    }

    #[test]
    fn test_with_founded_zero_is_absent() {
        let rec = DistilleryRecord::new("Talisker").unwrap().with_founded(0);
        assert_eq!(rec.founded, None);
    }

    #[test]
    fn test_config_validation() {
        assert!(ReconcileConfig::default().validate().is_ok());

        let bad_threshold = ReconcileConfig {
            similarity_threshold: 0.0,
            ..ReconcileConfig::default()
        };
        assert!(bad_threshold.validate().is_err());

        let above_one = ReconcileConfig {
            similarity_threshold: 1.01,
            ..ReconcileConfig::default()
        };
        assert!(above_one.validate().is_err());

        let exactly_one = ReconcileConfig {
            similarity_threshold: 1.0,
            max_keep_distance_km: 0.0,
            ..ReconcileConfig::default()
        };
        assert!(exactly_one.validate().is_ok());

        let negative = ReconcileConfig {
            max_keep_distance_km: -0.5,
            ..ReconcileConfig::default()
        };
        let err = negative.validate().unwrap_err().to_string();
        assert!(err.contains("max keep distance"));

        let nan = ReconcileConfig {
            similarity_threshold: f64::NAN,
            ..ReconcileConfig::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_changes_apply_and_absorb() {
        let mut changes = FieldChanges {
            country: Some("Scotland".to_string()),
            coordinates: Some(CoordinateChange {
                from: None,
                to: Coordinates::new(-3.0, 57.0).unwrap(),
                distance_km: None,
                reason: CoordinateReason::Filled,
            }),
            ..FieldChanges::default()
        };
        changes.absorb(FieldChanges {
            website: Some("https://example.com".to_string()),
            coordinates: Some(CoordinateChange {
                from: Coordinates::new(-3.0, 57.0),
                to: Coordinates::new(-4.0, 57.5).unwrap(),
                distance_km: Some(75.0),
                reason: CoordinateReason::Drifted,
            }),
            ..FieldChanges::default()
        });

        let coords = changes.coordinates.unwrap();
        assert_eq!(coords.from, None);
        assert_eq!(coords.reason, CoordinateReason::Filled);
        assert_eq!(coords.distance_km, None);

        let mut rec = DistilleryRecord::new("Glen Test").unwrap();
        changes.apply_to(&mut rec);
        assert_eq!(rec.country, "Scotland");
        assert_eq!(rec.website.as_deref(), Some("https://example.com"));
        assert_eq!(rec.coordinates, Coordinates::new(-4.0, 57.5));
    }

    #[test]
    fn test_coordinates_serialize_as_pair() {
        let json = serde_json::to_string(&Coordinates::new(-6.108, 55.64).unwrap()).unwrap();
        assert_eq!(json, "[-6.108,55.64]");
    }
}
