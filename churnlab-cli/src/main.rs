//! ChurnLab CLI: ingest, train, compare, monitor and serve commands.
//!
//! Commands:
//! - `ingest`: upsert a seed month, validate it and snapshot at its as-of date
//! - `snapshot`: re-snapshot the current base tables at an as-of date
//! - `build-dataset`: assemble a labelled dataset and export it as Parquet
//! - `train`: train and register a baseline model
//! - `train-and-compare`: train a candidate, compare with production, maybe promote
//! - `monitor`: drift check between two as-of dates, optionally chaining a retrain
//! - `promote`: manual stage transition (bootstraps Production)
//! - `models`: list registered versions
//! - `serve`: online prediction service

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use churnlab_core::domain::{ModelStage, ModelVersion, RetrainingSignal};
use churnlab_core::features::{FeatureStore, SqliteFeatureStore};
use churnlab_core::registry::{ModelRegistry, SqliteRegistry};
use churnlab_core::store::{LabelAlignment, SnapshotStore};
use churnlab_runner::{
    export_parquet, ingest_month, CandidateRun, DatasetAssembler, PipelineConfig,
    RetrainingController, TrainingController, TrainingOutcome,
};
use churnlab_serve::AppState;

/// Loaded when `--config` is not given and the file exists.
const DEFAULT_CONFIG: &str = "churnlab.toml";

#[derive(Parser)]
#[command(
    name = "churnlab",
    about = "ChurnLab: churn model training, promotion and drift monitoring"
)]
struct Cli {
    /// Path to a TOML pipeline config. Defaults to ./churnlab.toml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upsert a seed month, validate it and snapshot at its as-of date.
    Ingest {
        /// Directory holding the six seed CSVs. Defaults to [ingest].seed_dir.
        #[arg(long)]
        seed_dir: Option<PathBuf>,

        /// As-of date (YYYY-MM-DD). Defaults to [ingest].as_of.
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Snapshot the current base tables at an as-of date.
    Snapshot {
        #[arg(long)]
        as_of: NaiveDate,
    },
    /// Assemble the training dataset at an as-of date and export it as Parquet.
    BuildDataset {
        #[arg(long)]
        as_of: NaiveDate,

        /// Output Parquet file.
        #[arg(long, default_value = "data/training_dataset.parquet")]
        out: PathBuf,

        /// Label alignment: period, global or period_with_global_fallback.
        #[arg(long)]
        alignment: Option<LabelAlignment>,
    },
    /// Train and register a baseline model (stage None).
    Train {
        #[arg(long)]
        as_of: NaiveDate,
    },
    /// Train a candidate, compare it with production and promote if better.
    TrainAndCompare {
        #[arg(long)]
        as_of: NaiveDate,
    },
    /// Compare the feature distributions of two as-of dates.
    Monitor {
        #[arg(long)]
        reference: NaiveDate,

        #[arg(long)]
        current: NaiveDate,

        /// Override [monitoring].retrain_threshold.
        #[arg(long)]
        threshold: Option<f64>,

        /// Run train-and-compare on the current as-of date when retraining triggers.
        #[arg(long, default_value_t = false)]
        retrain: bool,
    },
    /// Move a model version to a stage.
    Promote {
        #[arg(long)]
        version: u32,

        /// None, Staging, Production or Archived.
        #[arg(long, default_value = "Production")]
        stage: ModelStage,

        /// Archive the current holder of the stage in the same transaction.
        #[arg(long, default_value_t = false)]
        archive_existing: bool,

        /// Registered model name. Defaults to [registry].model_name.
        #[arg(long)]
        name: Option<String>,
    },
    /// List registered versions of a model.
    Models {
        #[arg(long)]
        name: Option<String>,
    },
    /// Serve online features and predictions.
    Serve {
        /// Listen address. Defaults to [serving].bind.
        #[arg(long)]
        bind: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest { seed_dir, as_of } => {
            let seed_dir = seed_dir.unwrap_or_else(|| config.ingest.seed_dir.clone());
            let as_of = as_of.unwrap_or(config.ingest.as_of);
            run_ingest(&config, &seed_dir, as_of)
        }
        Commands::Snapshot { as_of } => run_snapshot(&config, as_of),
        Commands::BuildDataset {
            as_of,
            out,
            alignment,
        } => {
            if let Some(alignment) = alignment {
                config.labels.alignment = alignment;
            }
            run_build_dataset(&config, as_of, &out)
        }
        Commands::Train { as_of } => run_train(&config, as_of),
        Commands::TrainAndCompare { as_of } => run_train_and_compare(&config, as_of),
        Commands::Monitor {
            reference,
            current,
            threshold,
            retrain,
        } => {
            if let Some(threshold) = threshold {
                if !(0.0..=1.0).contains(&threshold) {
                    bail!("--threshold must be in [0, 1], got {threshold}");
                }
                config.monitoring.retrain_threshold = threshold;
            }
            run_monitor(&config, reference, current, retrain)
        }
        Commands::Promote {
            version,
            stage,
            archive_existing,
            name,
        } => {
            let name = name.unwrap_or_else(|| config.registry.model_name.clone());
            run_promote(&config, &name, ModelVersion(version), stage, archive_existing)
        }
        Commands::Models { name } => {
            let name = name.unwrap_or_else(|| config.registry.model_name.clone());
            run_models(&config, &name)
        }
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.serving.bind = bind;
            }
            run_serve(&config)
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => Ok(PipelineConfig::from_file(path)?),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            Ok(PipelineConfig::from_file(Path::new(DEFAULT_CONFIG))?)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn open_store(config: &PipelineConfig) -> Result<Arc<SnapshotStore>> {
    let store = SnapshotStore::open(&config.store.path)
        .with_context(|| format!("opening store {}", config.store.path.display()))?;
    Ok(Arc::new(store))
}

fn open_registry(config: &PipelineConfig) -> Result<SqliteRegistry> {
    SqliteRegistry::open(&config.registry.path)
        .with_context(|| format!("opening registry {}", config.registry.path.display()))
}

fn run_ingest(config: &PipelineConfig, seed_dir: &Path, as_of: NaiveDate) -> Result<()> {
    let store = open_store(config)?;
    let summary = ingest_month(&store, seed_dir, as_of)?;

    println!("Ingested {} as of {}", seed_dir.display(), summary.as_of);
    for (table, rows) in &summary.upserted {
        println!("  {table:<18} {rows:>6} rows upserted");
    }
    for (table, rows) in &summary.snapshot {
        println!("  {table:<40} {rows:>6} rows snapshotted");
    }
    Ok(())
}

fn run_snapshot(config: &PipelineConfig, as_of: NaiveDate) -> Result<()> {
    let store = open_store(config)?;
    let counts = store.snapshot(as_of)?;
    println!("Snapshot {as_of}");
    for (table, rows) in &counts {
        println!("  {table:<40} {rows:>6} rows");
    }
    Ok(())
}

fn run_build_dataset(config: &PipelineConfig, as_of: NaiveDate, out: &Path) -> Result<()> {
    let store = open_store(config)?;
    let features = SqliteFeatureStore::new(store.clone());
    let dataset = DatasetAssembler::new(&store, &features, config).training(as_of)?;
    let rows = export_parquet(&dataset, out)?;

    println!("Dataset {as_of}");
    println!("  rows:      {rows} ({} entities)", dataset.entity_count);
    println!("  columns:   {}", dataset.frame.column_names().len());
    if let Some(alignment) = dataset.alignment {
        println!("  labels:    {alignment}");
    }
    println!("  hash:      {}", dataset.dataset_hash.short());
    println!("  written:   {}", out.display());
    Ok(())
}

fn run_train(config: &PipelineConfig, as_of: NaiveDate) -> Result<()> {
    let store = open_store(config)?;
    let features = SqliteFeatureStore::new(store.clone());
    let registry = open_registry(config)?;
    let run = TrainingController::new(config, &store, &features, &registry).train_baseline(as_of)?;

    print_candidate(&run);
    println!();
    println!(
        "Registered {} {} (stage None). Promote with: churnlab promote --version {} --stage Production",
        config.registry.model_name, run.metrics.version, run.metrics.version.0
    );
    Ok(())
}

fn run_train_and_compare(config: &PipelineConfig, as_of: NaiveDate) -> Result<()> {
    let store = open_store(config)?;
    let features = SqliteFeatureStore::new(store.clone());
    let registry = open_registry(config)?;
    let outcome =
        TrainingController::new(config, &store, &features, &registry).train_and_compare(as_of)?;
    print_outcome(&outcome);
    Ok(())
}

fn run_monitor(
    config: &PipelineConfig,
    reference: NaiveDate,
    current: NaiveDate,
    retrain: bool,
) -> Result<()> {
    if reference >= current {
        warn!(%reference, %current, "reference is not before current");
    }
    let store = open_store(config)?;
    let features = SqliteFeatureStore::new(store.clone());
    let outcome = RetrainingController::new(config, &store, &features).run(reference, current)?;

    println!("{}", outcome.message());
    println!("  report:    {}", outcome.report.json.display());
    println!("  markdown:  {}", outcome.report.markdown.display());

    match (outcome.signal, retrain) {
        (RetrainingSignal::RetrainTriggered, true) => {
            info!(as_of = %current, "retraining triggered; running train-and-compare");
            let registry = open_registry(config)?;
            let outcome = TrainingController::new(config, &store, &features, &registry)
                .train_and_compare(current)?;
            println!();
            print_outcome(&outcome);
        }
        (RetrainingSignal::RetrainTriggered, false) => {
            println!();
            println!("Retraining recommended: churnlab train-and-compare --as-of {current}");
        }
        (RetrainingSignal::NoAction, _) => {}
    }
    Ok(())
}

fn run_promote(
    config: &PipelineConfig,
    name: &str,
    version: ModelVersion,
    stage: ModelStage,
    archive_existing: bool,
) -> Result<()> {
    let registry = open_registry(config)?;
    let info = registry.transition(name, version, stage, archive_existing)?;
    println!("{} {} -> {}", info.name, info.version, info.stage);
    Ok(())
}

fn run_models(config: &PipelineConfig, name: &str) -> Result<()> {
    let registry = open_registry(config)?;
    let versions = registry.list_versions(name)?;
    if versions.is_empty() {
        println!("No versions registered for '{name}'.");
        return Ok(());
    }

    println!(
        "{:<8} {:<12} {:>8} {:>8} {:>8}  {:<20} {:<10}",
        "Version", "Stage", "AUC", "F1", "Acc", "Run", "Dataset"
    );
    println!("{}", "-".repeat(82));
    for v in &versions {
        let metric = |key: &str| {
            v.metrics
                .get(key)
                .map_or_else(|| "-".to_string(), |m| format!("{m:.4}"))
        };
        let run = v.run_id.as_ref().map_or_else(|| "-".to_string(), |r| r.to_string());
        let hash = v
            .dataset_hash
            .as_ref()
            .map_or_else(|| "-".to_string(), |h| h.short().to_string());
        println!(
            "{:<8} {:<12} {:>8} {:>8} {:>8}  {:<20} {:<10}",
            v.version.to_string(),
            v.stage.as_str(),
            metric("val_auc"),
            metric("val_f1"),
            metric("val_acc"),
            run,
            hash
        );
    }
    Ok(())
}

fn run_serve(config: &PipelineConfig) -> Result<()> {
    // Serving degrades to 503 responses instead of refusing to start.
    let features: Option<Arc<dyn FeatureStore>> = match open_store(config) {
        Ok(store) => Some(Arc::new(SqliteFeatureStore::new(store))),
        Err(e) => {
            warn!(error = %e, "feature store unavailable");
            None
        }
    };
    let registry = open_registry(config)?;
    let state = AppState::from_registry(
        features,
        &registry,
        &config.registry.model_name,
        config.features.refs.clone(),
    )?;

    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    runtime.block_on(churnlab_serve::serve(state, &config.serving.bind))?;
    Ok(())
}

fn print_candidate(run: &CandidateRun) {
    println!();
    println!("=== Training Run ===");
    println!("Run:            {} ({})", run.run_name, run.run_id);
    println!("As-of:          {}", run.as_of);
    println!(
        "Rows:           {} train / {} validation",
        run.train_rows, run.validation_rows
    );
    if let Some(alignment) = run.alignment {
        println!("Labels:         {alignment}");
    }
    println!("Dataset:        {}", run.dataset_hash.short());
    println!("Train time:     {:.3}s", run.train_time_s);
    println!();
    println!("--- Validation ---");
    match run.metrics.auc {
        Some(auc) => println!("AUC:            {auc:.4}"),
        None => println!("AUC:            undefined (single-class validation set)"),
    }
    println!("F1:             {:.4}", run.metrics.f1);
    println!("Accuracy:       {:.4}", run.metrics.accuracy);
}

fn print_outcome(outcome: &TrainingOutcome) {
    print_candidate(&outcome.candidate);
    println!();
    println!("--- Production ({}) ---", outcome.production.version);
    match outcome.production.auc {
        Some(auc) => println!("AUC:            {auc:.4}"),
        None => println!("AUC:            undefined"),
    }
    println!("F1:             {:.4}", outcome.production.f1);
    println!("Accuracy:       {:.4}", outcome.production.accuracy);
    println!();
    println!("Decision:       {}", outcome.decision);
    println!("Reason:         {}", outcome.reason);
}
