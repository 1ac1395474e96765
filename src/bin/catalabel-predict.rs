//! Label every unlabeled row of a catalog table with trained model artifacts.

use std::path::PathBuf;

use catalabel::config::{AppConfig, resolve_profile};
use catalabel::inference::{BatchInferenceRunner, InferenceOptions};
use catalabel::store::SqliteStore;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "catalabel-predict")]
#[command(about = "Fill null label columns of a catalog table", long_about = None)]
struct Cli {
    /// Catalog table (or profile name)
    #[arg(long)]
    table: String,

    /// Model artifact per label stage, in stage order
    #[arg(long = "model-path", required = true)]
    model_paths: Vec<PathBuf>,

    /// Rows per fetch/update cycle
    #[arg(long)]
    batch_size: Option<usize>,

    /// Predict and log without writing labels
    #[arg(long)]
    dry_run: bool,

    /// SQLite database file
    #[arg(long, env = "CATALABEL_DB")]
    db: Option<PathBuf>,

    /// Configuration file
    #[arg(long, env = "CATALABEL_CONFIG")]
    config: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), catalabel::Error> {
    let cli = Cli::parse();
    if let Err(err) = catalabel::logging::init("catalabel-predict") {
        catalabel::logging::init_stderr();
        tracing::warn!("File logging unavailable: {err}");
    }

    let config = AppConfig::load(cli.config.as_deref())?;
    let profiles = config.profiles()?;
    let profile = resolve_profile(&profiles, &cli.table)?;
    let options = InferenceOptions {
        batch_size: match cli.batch_size {
            Some(size) => size,
            None => config.batch_size()?,
        },
        dry_run: cli.dry_run,
    };
    let runner = BatchInferenceRunner::load(profile, &cli.model_paths, options)?;
    let db_path = config.database_path(cli.db.as_deref())?;
    let mut store = SqliteStore::open(&db_path)?;
    tracing::info!(
        "Labeling {} in {} (batch size {}{})",
        runner.profile().table,
        db_path.display(),
        options.batch_size,
        if options.dry_run { ", dry run" } else { "" }
    );

    for summary in runner.run(&mut store)? {
        println!(
            "{:<12} {:<12} batches={:<4} predicted={:<8} updated={}{}",
            summary.stage,
            summary.column,
            summary.batches,
            summary.rows_predicted,
            summary.rows_updated,
            if summary.dry_run { " (dry run)" } else { "" }
        );
    }
    Ok(())
}
