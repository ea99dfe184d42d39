use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lpr_cars::{run_pipeline, AnomalyKind, AppConfig, PipelineOptions, PipelineReport};

/// Reconcile vehicle registration forms into the LPR cars database.
#[derive(Debug, Parser)]
#[command(name = "lpr-cars")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML config file (defaults match the live form).
    #[arg(long, global = true, env = "LPR_CARS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Full run: reconcile, write the allow-list and review reports.
    Reconcile(ReconcileArgs),
    /// Dry run: reconcile and print anomalies, write nothing.
    Check(CheckArgs),
}

#[derive(Debug, Args)]
struct ReconcileArgs {
    /// Form export CSV.
    #[arg(long)]
    input: PathBuf,

    /// Output directory (overrides config).
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// SQLite snapshot store.
    #[arg(long, env = "LPR_CARS_DB")]
    db: Option<PathBuf>,

    /// Start from the latest registry stored in --db.
    #[arg(long, requires = "db")]
    seed: bool,
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Form export CSV.
    #[arg(long)]
    input: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Reconcile(args) => {
            if let Some(dir) = args.out_dir {
                config.output.dir = dir;
            }
            let report = run_pipeline(
                &config,
                &PipelineOptions {
                    input: args.input,
                    db: args.db,
                    seed_from_db: args.seed,
                    write_outputs: true,
                },
            )?;
            print_report(&report);
        }
        Commands::Check(args) => {
            let report = run_pipeline(
                &config,
                &PipelineOptions {
                    input: args.input,
                    db: None,
                    seed_from_db: false,
                    write_outputs: false,
                },
            )?;
            print_report(&report);
            for anomaly in &report.outcome.anomalies {
                println!("  {} [{}] {}", anomaly.request, anomaly.kind, anomaly.detail);
            }
        }
    }

    Ok(())
}

fn print_report(report: &PipelineReport) {
    let summary = &report.outcome.summary;
    println!("✓ {}", summary.describe());

    for (kind, count) in &summary.anomalies_by_kind {
        println!("  {:<22} {}", kind.as_str(), count);
    }

    let review: usize = report
        .outcome
        .anomalies
        .iter()
        .filter(|a| a.kind.needs_manual_review())
        .count();
    if review > 0 {
        println!(
            "⚠️  {} anomalies need manual review ({} / {})",
            review,
            AnomalyKind::TargetAmbiguous,
            AnomalyKind::UnrecognizedRequest
        );
    }

    for path in &report.written {
        println!("✓ Wrote {}", path.display());
    }
    if let Some(run) = &report.saved_run {
        if run.cars_inserted {
            println!("✓ Stored run {}", run.run_id);
        } else {
            println!(
                "✓ Stored run {} (registry unchanged, cars from run {})",
                run.run_id, run.snapshot_run_id
            );
        }
    }
}
