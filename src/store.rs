//! SQLite-backed distillery catalogue.
//!
//! The catalogue is the authoritative list; reconciliation reads it once and
//! writes inserts and patches back in chunked transactions.

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, Row};
use std::path::Path;

use crate::models::{Coordinates, DistilleryRecord, ExistingRecord, Patch, ReconcileOutcome};
use crate::progress::{finish_phase, log_progress, phase_bar, Phase};

/// Rows written per transaction.
const WRITE_BATCH_SIZE: usize = 10_000;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS distilleries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        country TEXT NOT NULL DEFAULT 'Unknown',
        region TEXT NOT NULL DEFAULT 'Unknown',
        longitude REAL,
        latitude REAL,
        website TEXT,
        description TEXT,
        founded INTEGER,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );
";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommitSummary {
    pub inserted: usize,
    pub updated: usize,
}

pub struct DistilleryStore {
    conn: Connection,
}

impl DistilleryStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open catalogue database {}", path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;",
        )?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an existing catalogue read-only. A missing file is an error, not a new database.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open catalogue database {} read-only", path.display()))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("Failed to create distilleries table")
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM distilleries", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// All stored rows, ordered by id.
    pub fn load_all(&self) -> Result<Vec<ExistingRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, country, region, longitude, latitude, website, description,
                    founded, created_at, updated_at
             FROM distilleries
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], row_to_existing)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read distilleries")?;
        Ok(rows)
    }

    /// Insert one record; blank country and region are stored as "Unknown".
    pub fn insert(&self, record: &DistilleryRecord) -> Result<i64> {
        insert_record(&self.conn, record)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Write one patch. Returns false if the target row no longer exists.
    pub fn apply_patch(&self, patch: &Patch) -> Result<bool> {
        apply_patch(&self.conn, patch)
    }

    /// Write every insert and patch of an outcome.
    pub fn commit(&mut self, outcome: &ReconcileOutcome) -> Result<CommitSummary> {
        let total = (outcome.inserts.len() + outcome.patches.len()) as u64;
        let pb = phase_bar(Phase::Commit, total);
        let mut summary = CommitSummary::default();
        let mut done = 0u64;

        for chunk in outcome.inserts.chunks(WRITE_BATCH_SIZE) {
            let tx = self.conn.transaction()?;
            for record in chunk {
                insert_record(&tx, record)
                    .with_context(|| format!("Failed to insert '{}'", record.name))?;
                summary.inserted += 1;
                done += 1;
                pb.inc(1);
                log_progress(Phase::Commit, done, total);
            }
            tx.commit()?;
        }

        for chunk in outcome.patches.chunks(WRITE_BATCH_SIZE) {
            let tx = self.conn.transaction()?;
            for patch in chunk {
                let written = apply_patch(&tx, patch).with_context(|| {
                    format!("Failed to update '{}' (id {})", patch.target_name, patch.target_id)
                })?;
                if written {
                    summary.updated += 1;
                }
                done += 1;
                pb.inc(1);
                log_progress(Phase::Commit, done, total);
            }
            tx.commit()?;
        }

        finish_phase(
            &pb,
            Phase::Commit,
            format!(
                "Phase 3: Inserted {}, updated {}",
                summary.inserted, summary.updated
            ),
        );
        Ok(summary)
    }
}

fn row_to_existing(row: &Row) -> rusqlite::Result<ExistingRecord> {
    let lon: Option<f64> = row.get(4)?;
    let lat: Option<f64> = row.get(5)?;
    let founded: Option<i64> = row.get(8)?;

    Ok(ExistingRecord {
        id: row.get(0)?,
        record: DistilleryRecord {
            name: row.get(1)?,
            country: row.get(2)?,
            region: row.get(3)?,
            coordinates: lon.zip(lat).and_then(|(lon, lat)| Coordinates::new(lon, lat)),
            website: row.get(6)?,
            description: row.get(7)?,
            founded: founded.and_then(|y| u32::try_from(y).ok()).filter(|&y| y > 0),
        },
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

// Transaction derefs to Connection, so these serve both paths.

fn insert_record(conn: &Connection, record: &DistilleryRecord) -> Result<()> {
    let record = record.clone().into_insert();
    let mut stmt = conn.prepare_cached(
        "INSERT INTO distilleries
            (name, country, region, longitude, latitude, website, description, founded)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    stmt.execute(params![
        record.name,
        record.country,
        record.region,
        record.coordinates.map(|c| c.lon),
        record.coordinates.map(|c| c.lat),
        record.website,
        record.description,
        record.founded,
    ])?;
    Ok(())
}

fn apply_patch(conn: &Connection, patch: &Patch) -> Result<bool> {
    let changes = &patch.changes;
    if changes.is_empty() {
        return Ok(false);
    }

    let mut columns: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(country) = &changes.country {
        columns.push("country");
        values.push(Value::Text(country.clone()));
    }
    if let Some(region) = &changes.region {
        columns.push("region");
        values.push(Value::Text(region.clone()));
    }
    if let Some(website) = &changes.website {
        columns.push("website");
        values.push(Value::Text(website.clone()));
    }
    if let Some(description) = &changes.description {
        columns.push("description");
        values.push(Value::Text(description.clone()));
    }
    if let Some(founded) = changes.founded {
        columns.push("founded");
        values.push(Value::Integer(founded as i64));
    }
    if let Some(change) = &changes.coordinates {
        columns.push("longitude");
        values.push(Value::Real(change.to.lon));
        columns.push("latitude");
        values.push(Value::Real(change.to.lat));
    }

    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{} = ?{}", col, i + 1))
        .collect();
    let sql = format!(
        "UPDATE distilleries
         SET {}, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?{}",
        assignments.join(", "),
        values.len() + 1
    );
    values.push(Value::Integer(patch.target_id));

    let mut stmt = conn.prepare_cached(&sql)?;
    let n = stmt.execute(params_from_iter(values))?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CoordinateChange, CoordinateReason, FieldChanges, MatchKind, ReconcileConfig,
        ReconcileStats, UNKNOWN,
    };

    fn record(name: &str) -> DistilleryRecord {
        DistilleryRecord::new(name).unwrap()
    }

    fn patch(target_id: i64, changes: FieldChanges) -> Patch {
        Patch {
            target_id,
            target_name: String::new(),
            matched_by: MatchKind::ExactName,
            changes,
        }
    }

    #[test]
    fn test_insert_and_load_round_trip() {
        let store = DistilleryStore::open_in_memory().unwrap();
        let id = store
            .insert(
                &record("Springbank")
                    .with_country("Scotland")
                    .with_coordinates(-5.607, 55.425)
                    .with_founded(1828),
            )
            .unwrap();
        store.insert(&record("Yoichi")).unwrap();

        let rows = store.load_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(store.count().unwrap(), 2);

        let first = &rows[0];
        assert_eq!(first.id, id);
        assert_eq!(first.record.region, UNKNOWN);
        assert_eq!(first.record.coordinates, Coordinates::new(-5.607, 55.425));
        assert_eq!(first.record.founded, Some(1828));
        assert!(!first.created_at.is_empty());

        assert_eq!(rows[1].record.country, UNKNOWN);
        assert_eq!(rows[1].record.coordinates, None);
    }

    #[test]
    fn test_apply_patch_updates_only_changed_columns() {
        let store = DistilleryStore::open_in_memory().unwrap();
        let id = store
            .insert(&record("Ardbeg").with_website("https://ardbeg.com"))
            .unwrap();

        let written = store
            .apply_patch(&patch(
                id,
                FieldChanges {
                    country: Some("Scotland".to_string()),
                    coordinates: Some(CoordinateChange {
                        from: None,
                        to: Coordinates::new(-6.108, 55.640).unwrap(),
                        distance_km: None,
                        reason: CoordinateReason::Filled,
                    }),
                    ..FieldChanges::default()
                },
            ))
            .unwrap();
        assert!(written);

        let row = &store.load_all().unwrap()[0];
        assert_eq!(row.record.country, "Scotland");
        assert_eq!(row.record.region, UNKNOWN);
        assert_eq!(row.record.website.as_deref(), Some("https://ardbeg.com"));
        assert_eq!(row.record.coordinates, Coordinates::new(-6.108, 55.640));
    }

    #[test]
    fn test_apply_patch_missing_row() {
        let store = DistilleryStore::open_in_memory().unwrap();
        let changes = FieldChanges {
            founded: Some(1815),
            ..FieldChanges::default()
        };
        assert!(!store.apply_patch(&patch(42, changes)).unwrap());
        assert!(!store.apply_patch(&patch(42, FieldChanges::default())).unwrap());
    }

    #[test]
    fn test_commit_writes_inserts_and_patches() {
        let mut store = DistilleryStore::open_in_memory().unwrap();
        let id = store.insert(&record("Talisker")).unwrap();

        let outcome = ReconcileOutcome {
            config: ReconcileConfig::default(),
            stats: ReconcileStats::default(),
            inserts: vec![record("Oban").with_country("Scotland").into_insert()],
            patches: vec![patch(
                id,
                FieldChanges {
                    region: Some("Islands".to_string()),
                    ..FieldChanges::default()
                },
            )],
            skipped: Vec::new(),
        };

        let summary = store.commit(&outcome).unwrap();
        assert_eq!(
            summary,
            CommitSummary {
                inserted: 1,
                updated: 1
            }
        );

        let rows = store.load_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].record.region, "Islands");
        assert_eq!(rows[1].record.name, "Oban");
    }

    #[test]
    fn test_open_file_database() {
        let dir = std::env::temp_dir().join(format!("distillery-store-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("catalogue.sqlite3");

        {
            let store = DistilleryStore::open(&path).unwrap();
            store.insert(&record("Bowmore")).unwrap();
        }
        let store = DistilleryStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        drop(store);

        let read_only = DistilleryStore::open_read_only(&path).unwrap();
        assert_eq!(read_only.load_all().unwrap().len(), 1);
        assert!(read_only.insert(&record("Jura")).is_err());
        drop(read_only);

        let missing = dir.join("missing.sqlite3");
        assert!(DistilleryStore::open_read_only(&missing).is_err());
        assert!(!missing.exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
