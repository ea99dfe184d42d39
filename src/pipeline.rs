// 🔁 Pipeline - normalize → reconcile → report → export → store

use crate::config::AppConfig;
use crate::db::{load_latest_registry, save_outcome, setup_database, SavedRun};
use crate::engine::{ReconciliationEngine, ReconciliationOutcome};
use crate::export::{export_anomalies, export_cars, export_lpr, export_new_households};
use crate::normalizer::Normalizer;
use crate::registry::Registry;
use crate::report::HouseholdReport;
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Form export CSV
    pub input: PathBuf,

    /// SQLite snapshot store (None = don't persist)
    pub db: Option<PathBuf>,

    /// Start from the latest stored registry instead of an empty one
    pub seed_from_db: bool,

    /// false = dry run, only reconcile and summarize
    pub write_outputs: bool,
}

#[derive(Debug)]
pub struct PipelineReport {
    pub outcome: ReconciliationOutcome,
    pub written: Vec<PathBuf>,
    pub saved_run: Option<SavedRun>,
}

fn open_store(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn run_pipeline(config: &AppConfig, options: &PipelineOptions) -> Result<PipelineReport> {
    // 1. Normalize
    let requests = Normalizer::from_config(config).normalize_path(&options.input)?;

    // 2. Seed
    let store = options.db.as_deref().map(open_store).transpose()?;
    let registry = match (&store, options.seed_from_db) {
        (Some(conn), true) => {
            let entries = load_latest_registry(conn)?;
            info!(cars = entries.len(), "seeded registry from snapshot store");
            Registry::from_entries(entries)
        }
        _ => Registry::new(),
    };

    // 3. Reconcile
    let outcome = ReconciliationEngine::with_registry(registry).run(&requests);

    let mut written = Vec::new();
    let mut saved_run = None;
    if !options.write_outputs {
        return Ok(PipelineReport {
            outcome,
            written,
            saved_run,
        });
    }

    // 4. Reports + export
    let output = &config.output;
    fs::create_dir_all(&output.dir)
        .with_context(|| format!("Failed to create output dir: {}", output.dir.display()))?;

    let report = HouseholdReport::build(&outcome.entries);
    let over_capacity = report.over_capacity(config.reports.max_cars_per_household);
    let cutoff = config
        .reports
        .new_household_cutoff
        .and_hms_opt(0, 0, 0)
        .context("Invalid new household cutoff")?;
    let new_households = report.new_households(cutoff);
    info!(
        households = report.household_count(),
        over_capacity = over_capacity.len(),
        new_households = new_households.len(),
        "built household reports"
    );

    export_lpr(&output.lpr_path(), &outcome.entries)?;
    written.push(output.lpr_path());
    export_cars(&output.over_capacity_path(), &over_capacity)?;
    written.push(output.over_capacity_path());
    export_new_households(&output.new_households_path(), &new_households)?;
    written.push(output.new_households_path());
    export_anomalies(&output.anomalies_path(), &outcome.anomalies)?;
    written.push(output.anomalies_path());

    // 5. Store
    if let Some(conn) = &store {
        saved_run = Some(save_outcome(conn, &outcome)?);
    }

    Ok(PipelineReport {
        outcome,
        written,
        saved_run,
    })
}
