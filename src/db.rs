// 🗄️ Snapshot Store - SQLite persistence for reconciled registries
//
// A run = one reconciliation pass. Every run stores its anomaly log. Its final
// cars table is stored once per distinct registry: a run whose registry matches
// the previous snapshot points at that snapshot instead of copying the rows.
// The latest run's cars can seed the next pass.

use crate::anomaly::Anomaly;
use crate::engine::ReconciliationOutcome;
use crate::registry::RegistryEntry;
use crate::request::{HouseholdKey, PlateId};
use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Content hash of one entry (identity of the row inside a snapshot)
pub fn entry_hash(entry: &RegistryEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}|{}|{}|{}|{}|{}|{:?}",
        entry.plate_id,
        entry.timestamp.format(TS_FORMAT),
        entry.household_key.surname,
        entry.household_key.street,
        entry.household_key.house_number,
        entry.owner_name,
        entry.owner_id,
    ));
    format!("{:x}", hasher.finalize())
}

/// Order-sensitive digest over a whole registry
pub fn registry_digest(entries: &[RegistryEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry_hash(entry));
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRun {
    pub run_id: String,
    /// Run whose cars rows hold this run's registry (== run_id when fresh)
    pub snapshot_run_id: String,
    /// false when the registry matched the previous snapshot and was not copied
    pub cars_inserted: bool,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            created_at TEXT NOT NULL,
            registry_digest TEXT NOT NULL,
            snapshot_run_id TEXT NOT NULL,
            summary TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS cars (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            entry_hash TEXT NOT NULL,
            position INTEGER NOT NULL,
            ts TEXT NOT NULL,
            email TEXT,
            surname TEXT NOT NULL,
            street TEXT NOT NULL,
            home_number TEXT NOT NULL,
            apt_number INTEGER,
            name TEXT NOT NULL,
            owner_id INTEGER,
            car_id INTEGER NOT NULL,
            UNIQUE (run_id, entry_hash)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS anomalies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            run_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            detail TEXT NOT NULL,
            data TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cars_run ON cars(run_id, position)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_anomalies_run ON anomalies(run_id)",
        [],
    )?;

    Ok(())
}

struct StoredRun {
    run_id: String,
    registry_digest: String,
    snapshot_run_id: String,
}

fn latest_run(conn: &Connection) -> Result<Option<StoredRun>> {
    let run = conn
        .query_row(
            "SELECT run_id, registry_digest, snapshot_run_id FROM runs ORDER BY id DESC LIMIT 1",
            [],
            |row| {
                Ok(StoredRun {
                    run_id: row.get(0)?,
                    registry_digest: row.get(1)?,
                    snapshot_run_id: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(run)
}

fn snapshot_of(conn: &Connection, run_id: &str) -> Result<String> {
    conn.query_row(
        "SELECT snapshot_run_id FROM runs WHERE run_id = ?1",
        params![run_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| anyhow!("Unknown run: {}", run_id))
}

/// Store the final registry and anomaly log of one pass
pub fn save_outcome(conn: &Connection, outcome: &ReconciliationOutcome) -> Result<SavedRun> {
    let digest = registry_digest(&outcome.entries);
    let run_id = uuid::Uuid::new_v4().to_string();

    let reused = latest_run(conn)?
        .filter(|latest| latest.registry_digest == digest)
        .map(|latest| {
            info!(previous = %latest.run_id, "registry unchanged since last stored run");
            latest.snapshot_run_id
        });
    let cars_inserted = reused.is_none();
    let snapshot_run_id = reused.unwrap_or_else(|| run_id.clone());

    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO runs (run_id, created_at, registry_digest, snapshot_run_id, summary)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            run_id,
            Utc::now().to_rfc3339(),
            digest,
            snapshot_run_id,
            serde_json::to_string(&outcome.summary)?,
        ],
    )?;

    let cars: &[RegistryEntry] = if cars_inserted { &outcome.entries } else { &[] };
    for (position, entry) in cars.iter().enumerate() {
        let car_id = i64::try_from(entry.plate_id.0)
            .with_context(|| format!("plate {} does not fit in SQLite INTEGER", entry.plate_id))?;
        tx.execute(
            "INSERT INTO cars (
                run_id, entry_hash, position, ts, email, surname, street, home_number,
                apt_number, name, owner_id, car_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                run_id,
                entry_hash(entry),
                position as i64,
                entry.timestamp.format(TS_FORMAT).to_string(),
                entry.email,
                entry.household_key.surname,
                entry.household_key.street,
                entry.household_key.house_number,
                entry.apartment.map(i64::from),
                entry.owner_name,
                entry.owner_id,
                car_id,
            ],
        )?;
    }

    for anomaly in &outcome.anomalies {
        insert_anomaly(&tx, &run_id, anomaly)?;
    }

    tx.commit()?;
    info!(
        run_id = %run_id,
        cars = cars.len(),
        anomalies = outcome.anomalies.len(),
        "stored reconciliation run"
    );

    Ok(SavedRun {
        run_id,
        snapshot_run_id,
        cars_inserted,
    })
}

fn insert_anomaly(conn: &Connection, run_id: &str, anomaly: &Anomaly) -> Result<()> {
    conn.execute(
        "INSERT INTO anomalies (event_id, run_id, kind, detail, data) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            uuid::Uuid::new_v4().to_string(),
            run_id,
            anomaly.kind.as_str(),
            anomaly.detail,
            serde_json::to_string(anomaly)?,
        ],
    )?;
    Ok(())
}

/// Cars of the most recent run, in stored order (empty if nothing stored)
pub fn load_latest_registry(conn: &Connection) -> Result<Vec<RegistryEntry>> {
    match latest_run(conn)? {
        Some(run) => load_snapshot(conn, &run.snapshot_run_id),
        None => Ok(Vec::new()),
    }
}

/// Final registry of one run, following its snapshot pointer
pub fn load_registry(conn: &Connection, run_id: &str) -> Result<Vec<RegistryEntry>> {
    let snapshot_run_id = snapshot_of(conn, run_id)?;
    load_snapshot(conn, &snapshot_run_id)
}

fn load_snapshot(conn: &Connection, run_id: &str) -> Result<Vec<RegistryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT ts, email, surname, street, home_number, apt_number, name, owner_id, car_id
         FROM cars
         WHERE run_id = ?1
         ORDER BY position",
    )?;

    let rows = stmt
        .query_map(params![run_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<i64>>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<i64>>(7)?,
                row.get::<_, i64>(8)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(ts, email, surname, street, house_number, apt, name, owner_id, car_id)| -> Result<RegistryEntry> {
            let timestamp = NaiveDateTime::parse_from_str(&ts, TS_FORMAT)
                .with_context(|| format!("Corrupt timestamp in snapshot: {}", ts))?;
            let plate = u64::try_from(car_id).map_err(|_| anyhow!("Corrupt plate in snapshot: {}", car_id))?;
            let apartment = apt
                .map(u32::try_from)
                .transpose()
                .with_context(|| format!("Corrupt apartment in snapshot: {:?}", apt))?;

            Ok(RegistryEntry {
                timestamp,
                household_key: HouseholdKey {
                    surname,
                    street,
                    house_number,
                },
                owner_name: name,
                owner_id,
                plate_id: PlateId(plate),
                email,
                apartment,
            })
        })
        .collect()
}

/// Anomaly records of one run, in insertion order
pub fn get_anomalies_for_run(conn: &Connection, run_id: &str) -> Result<Vec<Anomaly>> {
    let mut stmt = conn.prepare("SELECT data FROM anomalies WHERE run_id = ?1 ORDER BY id")?;

    let payloads = stmt
        .query_map(params![run_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    payloads
        .iter()
        .map(|json| serde_json::from_str::<Anomaly>(json).context("Corrupt anomaly payload"))
        .collect()
}

pub fn count_runs(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
    Ok(count)
}
