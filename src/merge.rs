//! Field merge policy for matched records.
//!
//! Every mergeable field has exactly one rule in [`MERGE_RULES`]. Patches only
//! fill gaps; coordinates are the single field that may replace a populated
//! value, and only when forced or when the candidate is far enough away.

use crate::geo::haversine_km;
use crate::models::{
    CoordinateChange, CoordinateReason, Coordinates, DistilleryRecord, FieldChanges,
    ReconcileConfig, UNKNOWN,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Country,
    Region,
    Website,
    Description,
    Founded,
    Coordinates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRule {
    /// Copy when the stored value is empty or "Unknown" and the candidate's is neither
    FillIfUnknown,
    /// Copy when the stored value is absent
    FillIfAbsent,
    /// Fill if absent, replace if forced or beyond the keep distance
    ThresholdGated,
}

pub const MERGE_RULES: [(Field, MergeRule); 6] = [
    (Field::Country, MergeRule::FillIfUnknown),
    (Field::Region, MergeRule::FillIfUnknown),
    (Field::Website, MergeRule::FillIfAbsent),
    (Field::Description, MergeRule::FillIfAbsent),
    (Field::Founded, MergeRule::FillIfAbsent),
    (Field::Coordinates, MergeRule::ThresholdGated),
];

pub fn rule_for(field: Field) -> MergeRule {
    MERGE_RULES
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, rule)| *rule)
        .unwrap_or(MergeRule::FillIfAbsent)
}

/// A field's value as the rules see it. Blank text and a zero year are absent.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Year(u32),
    Point(Coordinates),
}

impl FieldValue {
    fn is_unknown(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s == UNKNOWN)
    }
}

fn text(value: &str) -> Option<FieldValue> {
    let value = value.trim();
    (!value.is_empty()).then(|| FieldValue::Text(value.to_string()))
}

/// Read one field of a record.
pub fn read_field(record: &DistilleryRecord, field: Field) -> Option<FieldValue> {
    match field {
        Field::Country => text(&record.country),
        Field::Region => text(&record.region),
        Field::Website => record.website.as_deref().and_then(text),
        Field::Description => record.description.as_deref().and_then(text),
        Field::Founded => record.founded.filter(|&y| y > 0).map(FieldValue::Year),
        Field::Coordinates => record.coordinates.map(FieldValue::Point),
    }
}

/// Distance between two values, defined only for coordinates.
fn distance_km(a: &FieldValue, b: &FieldValue) -> Option<f64> {
    match (a, b) {
        (FieldValue::Point(a), FieldValue::Point(b)) => Some(haversine_km(*a, *b)),
        _ => None,
    }
}

/// Apply one rule to a stored/candidate value pair. Returns the value to
/// write and why, or None when the stored value stays.
pub fn apply_rule(
    rule: MergeRule,
    existing: Option<&FieldValue>,
    candidate: Option<&FieldValue>,
    config: &ReconcileConfig,
) -> Option<(FieldValue, CoordinateReason)> {
    let candidate = candidate?;
    match rule {
        MergeRule::FillIfUnknown => {
            let stored_unknown = existing.map_or(true, FieldValue::is_unknown);
            (stored_unknown && !candidate.is_unknown())
                .then(|| (candidate.clone(), CoordinateReason::Filled))
        }
        MergeRule::FillIfAbsent => {
            existing.is_none().then(|| (candidate.clone(), CoordinateReason::Filled))
        }
        MergeRule::ThresholdGated => {
            let Some(existing) = existing else {
                return Some((candidate.clone(), CoordinateReason::Filled));
            };
            // Nothing to write when the pair is identical, forced or not
            if existing == candidate {
                return None;
            }
            if config.force_coordinates {
                return Some((candidate.clone(), CoordinateReason::Forced));
            }
            match distance_km(existing, candidate) {
                Some(d) if d > config.max_keep_distance_km => {
                    Some((candidate.clone(), CoordinateReason::Drifted))
                }
                _ => None,
            }
        }
    }
}

fn record_change(
    changes: &mut FieldChanges,
    field: Field,
    existing: Option<&FieldValue>,
    value: FieldValue,
    reason: CoordinateReason,
) {
    match (field, value) {
        (Field::Country, FieldValue::Text(s)) => changes.country = Some(s),
        (Field::Region, FieldValue::Text(s)) => changes.region = Some(s),
        (Field::Website, FieldValue::Text(s)) => changes.website = Some(s),
        (Field::Description, FieldValue::Text(s)) => changes.description = Some(s),
        (Field::Founded, FieldValue::Year(y)) => changes.founded = Some(y),
        (Field::Coordinates, FieldValue::Point(to)) => {
            let from = match existing {
                Some(FieldValue::Point(from)) => Some(*from),
                _ => None,
            };
            changes.coordinates = Some(CoordinateChange {
                from,
                to,
                distance_km: from.map(|from| haversine_km(from, to)),
                reason,
            });
        }
        // read_field ties each field to one value shape
        _ => {}
    }
}

/// Compute the change set a candidate contributes to a matched record under
/// an arbitrary rule table.
pub fn compute_changes_with(
    rules: &[(Field, MergeRule)],
    existing: &DistilleryRecord,
    candidate: &DistilleryRecord,
    config: &ReconcileConfig,
) -> FieldChanges {
    let mut changes = FieldChanges::default();

    for &(field, rule) in rules {
        let stored = read_field(existing, field);
        let offered = read_field(candidate, field);
        if let Some((value, reason)) = apply_rule(rule, stored.as_ref(), offered.as_ref(), config) {
            record_change(&mut changes, field, stored.as_ref(), value, reason);
        }
    }

    changes
}

/// Compute the change set a candidate contributes to a matched record,
/// applying each field's rule from [`MERGE_RULES`].
pub fn compute_changes(
    existing: &DistilleryRecord,
    candidate: &DistilleryRecord,
    config: &ReconcileConfig,
) -> FieldChanges {
    compute_changes_with(&MERGE_RULES, existing, candidate, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinates;

    fn record(name: &str) -> DistilleryRecord {
        DistilleryRecord::new(name).unwrap()
    }

    #[test]
    fn test_every_field_has_one_rule() {
        for field in [
            Field::Country,
            Field::Region,
            Field::Website,
            Field::Description,
            Field::Founded,
            Field::Coordinates,
        ] {
            assert_eq!(MERGE_RULES.iter().filter(|(f, _)| *f == field).count(), 1);
        }
        assert_eq!(rule_for(Field::Country), MergeRule::FillIfUnknown);
        assert_eq!(rule_for(Field::Coordinates), MergeRule::ThresholdGated);
    }

    #[test]
    fn test_country_fills_unknown_only() {
        let config = ReconcileConfig::default();
        let candidate = record("Glenfiddich").with_country("Scotland");

        let unknown = record("Glenfiddich").with_country("Unknown");
        assert_eq!(
            compute_changes(&unknown, &candidate, &config).country.as_deref(),
            Some("Scotland")
        );

        let empty = record("Glenfiddich");
        assert_eq!(
            compute_changes(&empty, &candidate, &config).country.as_deref(),
            Some("Scotland")
        );

        let set = record("Glenfiddich").with_country("United Kingdom");
        assert!(compute_changes(&set, &candidate, &config).country.is_none());
    }

    #[test]
    fn test_unknown_candidate_never_copied() {
        let config = ReconcileConfig::default();
        let existing = record("Ardbeg");
        let candidate = record("Ardbeg").with_country("Unknown").with_region("  ");
        let changes = compute_changes(&existing, &candidate, &config);
        assert!(changes.country.is_none());
        assert!(changes.region.is_none());
    }

    #[test]
    fn test_optional_text_and_year_fill_gaps_only() {
        let config = ReconcileConfig::default();
        let existing = record("Ardbeg").with_website("https://ardbeg.com");
        let candidate = record("Ardbeg")
            .with_website("https://other.example")
            .with_description("Islay distillery on the south coast")
            .with_founded(1815);

        let changes = compute_changes(&existing, &candidate, &config);
        assert!(changes.website.is_none());
        assert_eq!(
            changes.description.as_deref(),
            Some("Islay distillery on the south coast")
        );
        assert_eq!(changes.founded, Some(1815));

        let existing = existing.with_founded(1798);
        assert!(compute_changes(&existing, &candidate, &config).founded.is_none());
    }

    #[test]
    fn test_coordinates_filled_when_missing() {
        let config = ReconcileConfig::default();
        let existing = record("Glenfiddich");
        let candidate = record("Glenfiddich").with_coordinates(-3.125, 57.447);
        let change = compute_changes(&existing, &candidate, &config).coordinates.unwrap();
        assert_eq!(change.reason, CoordinateReason::Filled);
        assert_eq!(change.to, Coordinates::new(-3.125, 57.447).unwrap());
        assert_eq!(change.from, None);
    }

    #[test]
    fn test_coordinates_kept_within_threshold() {
        let config = ReconcileConfig::default();
        let existing = record("Ardbeg").with_coordinates(-6.108, 55.640);
        let candidate = record("Ardbeg").with_coordinates(-6.110, 55.641);
        assert!(compute_changes(&existing, &candidate, &config).coordinates.is_none());
    }

    #[test]
    fn test_coordinates_forced() {
        let config = ReconcileConfig {
            force_coordinates: true,
            ..ReconcileConfig::default()
        };
        let existing = record("Ardbeg").with_coordinates(-6.108, 55.640);
        let candidate = record("Ardbeg").with_coordinates(-6.110, 55.641);
        let change = compute_changes(&existing, &candidate, &config).coordinates.unwrap();
        assert_eq!(change.reason, CoordinateReason::Forced);
        assert!(change.distance_km.unwrap() < 2.0);

        // Identical coordinates are not rewritten even when forced
        let same = record("Ardbeg").with_coordinates(-6.108, 55.640);
        assert!(compute_changes(&existing, &same, &config).coordinates.is_none());
    }

    #[test]
    fn test_coordinates_replaced_beyond_threshold() {
        let config = ReconcileConfig::default();
        // Candidate placed on the mainland, far from Islay
        let existing = record("Ardbeg").with_coordinates(-6.108, 55.640);
        let candidate = record("Ardbeg").with_coordinates(-4.25, 55.86);
        let change = compute_changes(&existing, &candidate, &config).coordinates.unwrap();
        assert_eq!(change.reason, CoordinateReason::Drifted);
        assert!(change.distance_km.unwrap() > 100.0);
    }

    #[test]
    fn test_swapping_a_rule_changes_the_outcome() {
        let config = ReconcileConfig::default();
        let existing = record("Ardbeg")
            .with_country("Unknown")
            .with_region("Islay")
            .with_coordinates(-6.108, 55.640);
        let candidate = record("Ardbeg")
            .with_country("Scotland")
            .with_region("Kildalton")
            .with_coordinates(-4.25, 55.86);

        let default = compute_changes(&existing, &candidate, &config);
        assert_eq!(default.country.as_deref(), Some("Scotland"));
        assert!(default.region.is_none());
        assert!(default.coordinates.is_some());

        // "Unknown" counts as present under FillIfAbsent
        let table = [
            (Field::Country, MergeRule::FillIfAbsent),
            (Field::Region, MergeRule::ThresholdGated),
            (Field::Coordinates, MergeRule::FillIfAbsent),
        ];
        let forced = ReconcileConfig {
            force_coordinates: true,
            ..config
        };
        let swapped = compute_changes_with(&table, &existing, &candidate, &forced);
        assert!(swapped.country.is_none());
        assert_eq!(swapped.region.as_deref(), Some("Kildalton"));
        assert!(swapped.coordinates.is_none());

        // Without force, text never drifts
        let unforced = compute_changes_with(&table, &existing, &candidate, &config);
        assert!(unforced.region.is_none());
    }

    #[test]
    fn test_fill_if_unknown_on_optional_field() {
        let config = ReconcileConfig::default();
        let table = [(Field::Website, MergeRule::FillIfUnknown)];
        let existing = record("Ardbeg").with_website("Unknown");
        let candidate = record("Ardbeg").with_website("https://www.ardbeg.com");
        let changes = compute_changes_with(&table, &existing, &candidate, &config);
        assert_eq!(changes.website.as_deref(), Some("https://www.ardbeg.com"));
    }

    #[test]
    fn test_no_candidate_coordinates_no_change() {
        let config = ReconcileConfig {
            force_coordinates: true,
            ..ReconcileConfig::default()
        };
        let existing = record("Ardbeg").with_coordinates(-6.108, 55.640);
        let candidate = record("Ardbeg");
        assert!(compute_changes(&existing, &candidate, &config).is_empty());
    }
}
