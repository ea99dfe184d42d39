// LPR Cars Registry - Core Library
// Exposes the reconciliation core and its collaborators for the CLI and tests

pub mod request;        // Typed form requests
pub mod registry;       // Keyed cars table
pub mod anomaly;        // Recoverable failure records
pub mod engine;         // Reconciliation Engine
pub mod cleanup;        // Post-pass name cleanup + plate dedup
pub mod config;         // TOML configuration
pub mod normalizer;     // Form export CSV → Requests
pub mod report;         // Household reports + allow-list rows
pub mod export;         // CSV writers
pub mod db;             // SQLite snapshot store
pub mod pipeline;       // End-to-end run

// Re-export commonly used types
pub use request::{
    HouseholdKey, PlateId, Request, RequestKind, RequestRef, VehicleClaim,
};
pub use registry::{
    EntryId, Lookup, Registry, RegistryEntry, RegistryError,
};
pub use anomaly::{Anomaly, AnomalyKind};
pub use engine::{
    Mutation, MutationEvent, MutationOutcome,
    ReconciliationEngine, ReconciliationOutcome, ReconciliationSummary,
};
pub use cleanup::{dedupe_by_plate, normalize_names, strip_surname, DedupOutcome};
pub use config::{AppConfig, OutputConfig, ReportConfig, SourceConfig, SurveyVocabulary};
pub use normalizer::{classify, Normalizer};
pub use report::{lpr_rows, HouseholdReport, LprRow, NewHousehold};
pub use db::{
    setup_database, save_outcome, load_latest_registry, load_registry,
    get_anomalies_for_run, count_runs, SavedRun,
};
pub use pipeline::{run_pipeline, PipelineOptions, PipelineReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
