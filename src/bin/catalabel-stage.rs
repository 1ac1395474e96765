//! Copy new products from an upstream table into a catalog table with null label flags.

use std::path::PathBuf;

use catalabel::config::{AppConfig, resolve_profile};
use catalabel::store::{
    DuplicatePolicy, Identifier, SqliteStore, StagingSource, StagingTarget, StoreError,
};
use clap::Parser;

const STORE_NAME_COLUMN: &str = "STORE_NAME";

#[derive(Parser, Debug)]
#[command(name = "catalabel-stage")]
#[command(about = "Stage upstream products into a catalog table", long_about = None)]
struct Cli {
    /// Upstream table to copy from
    #[arg(long)]
    source_table: String,

    #[arg(long)]
    source_id_column: String,

    #[arg(long)]
    source_name_column: String,

    /// Optional store/shop column, copied into the catalog's `STORE_NAME`
    #[arg(long)]
    source_store_column: Option<String>,

    /// Catalog table (or profile name) receiving the rows
    #[arg(long)]
    table: String,

    /// Skip ids that already exist instead of failing the run
    #[arg(long)]
    ignore_duplicates: bool,

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
    if let Err(err) = catalabel::logging::init("catalabel-stage") {
        catalabel::logging::init_stderr();
        tracing::warn!("File logging unavailable: {err}");
    }

    let config = AppConfig::load(cli.config.as_deref())?;
    let profiles = config.profiles()?;
    let profile = resolve_profile(&profiles, &cli.table)?;
    let source = StagingSource {
        table: Identifier::new(&cli.source_table)?,
        id_column: Identifier::new(&cli.source_id_column)?,
        name_column: Identifier::new(&cli.source_name_column)?,
        store_column: cli
            .source_store_column
            .as_deref()
            .map(Identifier::new)
            .transpose()?,
    };
    let target = StagingTarget {
        table: Identifier::new(&profile.table)?,
        id_column: Identifier::new(&profile.id_column)?,
        name_column: Identifier::new(&profile.name_column)?,
        store_column: source
            .store_column
            .as_ref()
            .map(|_| Identifier::new(STORE_NAME_COLUMN))
            .transpose()?,
    };
    let policy = if cli.ignore_duplicates {
        DuplicatePolicy::Ignore
    } else {
        DuplicatePolicy::Reject
    };

    let db_path = config.database_path(cli.db.as_deref())?;
    let mut store = SqliteStore::open(&db_path)?;
    match store.stage_products(&source, &target, policy) {
        Ok(summary) => {
            println!(
                "{}: {} candidates, {} inserted, {} duplicates ignored",
                profile.table, summary.candidates, summary.inserted, summary.ignored_duplicates
            );
            Ok(())
        }
        Err(StoreError::Staging { attempted, failures }) => {
            for failure in &failures {
                eprintln!("{failure}");
            }
            Err(StoreError::Staging { attempted, failures }.into())
        }
        Err(err) => Err(err.into()),
    }
}
