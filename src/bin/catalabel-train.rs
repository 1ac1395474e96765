//! Train one label stage of a catalog table and write its model artifact.

use std::path::PathBuf;

use catalabel::artifact::{ArtifactLayout, LayoutKind};
use catalabel::config::{AppConfig, ConfigError, resolve_profile};
use catalabel::labeling::BinaryLabel;
use catalabel::store::SqliteStore;
use catalabel::training::{HoldoutOutcome, TrainingReport, train_stage, write_labeled_jsonl};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "catalabel-train")]
#[command(about = "Self-train a label stage from manual labels and keyword rules", long_about = None)]
struct Cli {
    /// Catalog table (or profile name)
    #[arg(long)]
    table: String,

    /// Label stage to train, e.g. `food` or `ingredient`
    #[arg(long)]
    stage: String,

    /// Artifact destination: bundle file or directory; split needs a new or empty directory
    #[arg(long)]
    out: PathBuf,

    /// Artifact layout: bundle or split
    #[arg(long, default_value = "bundle")]
    layout: LayoutKind,

    /// Minimum pseudo-label confidence (inclusive)
    #[arg(long)]
    conf_threshold: Option<f64>,

    /// Fraction of seed rows per class held out for evaluation
    #[arg(long)]
    test_size: Option<f64>,

    /// Write every training row with its final label as JSON lines
    #[arg(long)]
    out_labeled: Option<PathBuf>,

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
    if let Err(err) = catalabel::logging::init("catalabel-train") {
        catalabel::logging::init_stderr();
        tracing::warn!("File logging unavailable: {err}");
    }

    let config = AppConfig::load(cli.config.as_deref())?;
    let profiles = config.profiles()?;
    let profile = resolve_profile(&profiles, &cli.table)?;
    let stage = profile
        .stage(&cli.stage)
        .ok_or_else(|| ConfigError::UnknownStage {
            profile: profile.name.clone(),
            stage: cli.stage.clone(),
        })?;

    let mut options = config.train_options();
    if let Some(threshold) = cli.conf_threshold {
        options.conf_threshold = threshold;
    }
    if let Some(test_size) = cli.test_size {
        options.test_fraction = test_size;
    }

    let db_path = config.database_path(cli.db.as_deref())?;
    let mut store = SqliteStore::open(&db_path)?;
    let outcome = train_stage(&mut store, &profile, stage, options)?;
    print_report(&outcome.report);

    let layout = outcome.artifact.save(&cli.out, cli.layout)?;
    match &layout {
        ArtifactLayout::Bundled(path) => println!("model written to {}", path.display()),
        ArtifactLayout::Split(paths) => {
            for path in paths.all() {
                println!("model part written to {}", path.display());
            }
        }
    }

    if let Some(path) = &cli.out_labeled {
        let rows = outcome.labeled_rows();
        write_labeled_jsonl(path, &rows).map_err(catalabel::training::TrainError::from)?;
        println!("{} labeled rows written to {}", rows.len(), path.display());
    }
    Ok(())
}

fn print_report(report: &TrainingReport) {
    println!(
        "stage {}: {} rows, seeds manual={} rule={} (neg={} pos={})",
        report.stage,
        report.rows_total,
        report.seed_sources.manual,
        report.seed_sources.rule,
        report.seed_distribution.negative,
        report.seed_distribution.positive
    );
    match &report.holdout {
        HoldoutOutcome::Evaluated(metrics) => {
            println!(
                "holdout accuracy: {:.4} (train={} test={})",
                metrics.accuracy, metrics.train_rows, metrics.test_rows
            );
            for stats in &metrics.per_class {
                println!(
                    "class {}  precision={:.3}  recall={:.3}  support={}",
                    stats.label.as_i64(),
                    stats.precision,
                    stats.recall,
                    stats.support
                );
            }
            println!("confusion matrix (rows=true, cols=pred):");
            for truth in BinaryLabel::ALL {
                let mut row = String::new();
                for predicted in BinaryLabel::ALL {
                    row.push_str(&format!("{:6}", metrics.confusion.get(truth, predicted)));
                }
                println!("{row}");
            }
        }
        HoldoutOutcome::Skipped { reason } => println!("holdout skipped: {reason}"),
    }
    println!(
        "pseudo-labels: {} of {} accepted; final corpus {} (neg={} pos={})",
        report.pseudo_accepted,
        report.pseudo_candidates,
        report.final_corpus_size,
        report.final_distribution.negative,
        report.final_distribution.positive
    );
}
