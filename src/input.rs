//! Candidate loading from JSON or CSV datasets.
//!
//! Malformed fields are coerced to absent instead of failing the batch. Only
//! a missing or blank name drops a row.

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use std::io::Read;
use std::path::Path;

use crate::models::{CandidateRecord, Coordinates, DistilleryRecord};

/// WKT point as exported by knowledge bases, e.g. `Point(-3.125 57.447)`.
static WKT_POINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*point\s*\(\s*([^\s()]+)\s+([^\s()]+)\s*\)\s*$").unwrap()
});

/// Leading year of a date-ish string: `1887`, `1887-01-01`, `+1887-01-01T00:00:00Z`.
static LEADING_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\+?(\d{1,4})(?:\D|$)").unwrap());

#[derive(Debug, Default)]
pub struct LoadedCandidates {
    pub records: Vec<CandidateRecord>,
    /// Rows dropped for a missing or blank name
    pub dropped: usize,
}

/// Load candidates from `path`; `.csv` selects CSV, anything else JSON.
pub fn load_candidates(path: &Path) -> Result<LoadedCandidates> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));

    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open candidate file {}", path.display()))?;

    if is_csv {
        parse_csv(file).with_context(|| format!("Failed to parse CSV {}", path.display()))
    } else {
        let mut text = String::new();
        std::io::BufReader::new(file)
            .read_to_string(&mut text)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        parse_json(&text).with_context(|| format!("Failed to parse JSON {}", path.display()))
    }
}

// ============================================================================
// JSON
// ============================================================================

/// Parse a top-level JSON array of candidate objects.
pub fn parse_json(text: &str) -> Result<LoadedCandidates> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Array(items) = value else {
        bail!("expected a top-level array of distillery objects");
    };

    let mut loaded = LoadedCandidates::default();
    for item in &items {
        match candidate_from_json(item) {
            Some(record) => loaded.records.push(record),
            None => loaded.dropped += 1,
        }
    }
    Ok(loaded)
}

fn candidate_from_json(item: &Value) -> Option<CandidateRecord> {
    let name = item.get("name")?.as_str()?;
    let mut record = DistilleryRecord::new(name)?
        .with_country(json_str(item, "country"))
        .with_region(json_str(item, "region"))
        .with_website(json_str(item, "website"))
        .with_description(json_str(item, "description"));
    record.coordinates = item.get("coordinates").and_then(coordinates_from_json);
    record.founded = item.get("founded").and_then(year_from_json);
    Some(record)
}

fn json_str<'a>(item: &'a Value, key: &str) -> &'a str {
    item.get(key).and_then(Value::as_str).unwrap_or("")
}

fn coordinates_from_json(value: &Value) -> Option<Coordinates> {
    match value {
        Value::Array(pair) if pair.len() == 2 => {
            Coordinates::new(pair[0].as_f64()?, pair[1].as_f64()?)
        }
        Value::String(s) => parse_coordinates(s),
        _ => None,
    }
}

fn year_from_json(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => {
            if let Some(y) = n.as_u64() {
                return u32::try_from(y).ok().filter(|&y| y > 0);
            }
            let f = n.as_f64()?;
            (f.fract() == 0.0 && f >= 1.0 && f <= u32::MAX as f64).then_some(f as u32)
        }
        Value::String(s) => parse_year(s),
        _ => None,
    }
}

// ============================================================================
// CSV
// ============================================================================

const CSV_COLUMNS: [&str; 9] = [
    "name",
    "country",
    "region",
    "longitude",
    "latitude",
    "coordinates",
    "website",
    "description",
    "founded",
];

/// Column positions resolved from the header row.
#[derive(Debug)]
struct CsvColumns {
    positions: [Option<usize>; 9],
}

impl CsvColumns {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let mut positions = [None; 9];
        for (slot, column) in positions.iter_mut().zip(CSV_COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(column));
        }
        Self { positions }
    }

    /// Field text for `column`; invalid UTF-8 is replaced, not rejected.
    fn get<'r>(&self, row: &'r csv::ByteRecord, column: &str) -> Cow<'r, str> {
        CSV_COLUMNS
            .iter()
            .position(|c| *c == column)
            .and_then(|i| self.positions[i])
            .and_then(|p| row.get(p))
            .map(String::from_utf8_lossy)
            .unwrap_or(Cow::Borrowed(""))
    }
}

/// Parse CSV with a header row. Unknown columns are ignored.
pub fn parse_csv<R: Read>(reader: R) -> Result<LoadedCandidates> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV header row")?.clone();
    let columns = CsvColumns::from_headers(&headers);
    if columns.positions[0].is_none() {
        bail!("CSV header has no 'name' column");
    }

    let mut loaded = LoadedCandidates::default();
    // Byte records so one badly encoded row degrades instead of aborting the import
    for (line, result) in rdr.byte_records().enumerate() {
        let row = result.with_context(|| format!("Failed to read CSV row {}", line + 2))?;
        match candidate_from_csv(&columns, &row) {
            Some(record) => loaded.records.push(record),
            None => loaded.dropped += 1,
        }
    }
    Ok(loaded)
}

fn candidate_from_csv(columns: &CsvColumns, row: &csv::ByteRecord) -> Option<CandidateRecord> {
    let mut record = DistilleryRecord::new(&columns.get(row, "name"))?
        .with_country(&columns.get(row, "country"))
        .with_region(&columns.get(row, "region"))
        .with_website(&columns.get(row, "website"))
        .with_description(&columns.get(row, "description"));

    let lon = columns.get(row, "longitude").trim().parse::<f64>().ok();
    let lat = columns.get(row, "latitude").trim().parse::<f64>().ok();
    record.coordinates = match lon.zip(lat) {
        Some((lon, lat)) => Coordinates::new(lon, lat),
        None => parse_coordinates(&columns.get(row, "coordinates")),
    };
    record.founded = parse_year(&columns.get(row, "founded"));
    Some(record)
}

// ============================================================================
// Shared coercion
// ============================================================================

/// Coordinates from text: WKT `Point(lon lat)` or a JSON `[lon, lat]` pair.
pub fn parse_coordinates(text: &str) -> Option<Coordinates> {
    let text = text.trim();
    if let Some(caps) = WKT_POINT.captures(text) {
        let lon = caps[1].parse::<f64>().ok()?;
        let lat = caps[2].parse::<f64>().ok()?;
        return Coordinates::new(lon, lat);
    }
    if text.starts_with('[') {
        let pair: Value = serde_json::from_str(text).ok()?;
        return coordinates_from_json(&pair);
    }
    None
}

/// Positive year at the start of a string.
pub fn parse_year(text: &str) -> Option<u32> {
    let caps = LEADING_YEAR.captures(text)?;
    caps[1].parse::<u32>().ok().filter(|&y| y > 0)
}
