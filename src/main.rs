use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ensemble_stacker::config::{load_config, render_default, EngineConfig, EngineProfile};
use ensemble_stacker::data::synthetic::{generate, generate_regime};
use ensemble_stacker::data::{load_dataset, load_regime, write_dataset, write_regime, SyntheticKind};
use ensemble_stacker::ml::generate_folds;
use ensemble_stacker::{Dataset, StackingPipeline, StackingReport};

#[derive(Parser)]
#[command(name = "stacker")]
#[command(author = "Ensemble Stacker")]
#[command(version = "0.1.0")]
#[command(about = "Leakage-safe ensemble stacking and probability calibration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Learner preset; overrides the configured profile. Ignored when the
    /// config lists `pool.learners` explicitly.
    #[arg(short, long, value_enum)]
    profile: Option<EngineProfile>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full stacking pipeline on a CSV feature table
    Run {
        /// Feature CSV (timestamp, features..., target)
        #[arg(short, long)]
        data: PathBuf,
        /// Regime CSV (row_index, columns...)
        #[arg(short, long)]
        regime: Option<PathBuf>,
        /// Write the report as pretty JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate a seeded synthetic series and run the pipeline on it
    Synthetic {
        #[arg(long, default_value = "10000")]
        rows: usize,
        #[arg(long, default_value = "20")]
        features: usize,
        #[arg(long, value_enum, default_value = "separable")]
        kind: SyntheticKind,
        #[arg(long, default_value = "42")]
        seed: u64,
        /// Also generate regime columns for every row
        #[arg(long)]
        with_regime: bool,
        /// Save the generated data as CSV instead of discarding it
        #[arg(long)]
        save: Option<PathBuf>,
        /// Write the report as pretty JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the fold plan for a series length
    Folds {
        #[arg(long)]
        rows: usize,
    },
    /// Print the default configuration as TOML
    DefaultConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs)?;

    match cli.command {
        Commands::DefaultConfig => {
            print!("{}", render_default()?);
        }
        Commands::Folds { rows } => {
            let config = resolve_config(cli.config.as_deref(), cli.profile)?;
            print_fold_plan(&config, rows)?;
        }
        Commands::Run { data, regime, output } => {
            let config = resolve_config(cli.config.as_deref(), cli.profile)?;
            info!("Ensemble stacker v0.1.0");
            let dataset = load_dataset(&data, &config.data.target_column)?;
            let regime = regime.map(|path| load_regime(&path)).transpose()?;
            let report = run_pipeline(config, &dataset, regime.as_ref())?;
            finish(&report, output.as_deref())?;
        }
        Commands::Synthetic {
            rows,
            features,
            kind,
            seed,
            with_regime,
            save,
            output,
        } => {
            let config = resolve_config(cli.config.as_deref(), cli.profile)?;
            info!("Generating {} rows x {} features ({:?}, seed {})", rows, features, kind, seed);
            let dataset = generate(rows, features, kind, seed)?;
            let regime = with_regime.then(|| generate_regime(rows, seed));
            if let Some(path) = &save {
                write_dataset(path, &dataset, &config.data.target_column)?;
                if let Some(regime) = &regime {
                    let regime_path = path.with_extension("regime.csv");
                    write_regime(&regime_path, regime)?;
                    info!("Regime columns saved to {:?}", regime_path);
                }
            }
            let report = run_pipeline(config, &dataset, regime.as_ref())?;
            finish(&report, output.as_deref())?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);
    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn resolve_config(path: Option<&Path>, profile: Option<EngineProfile>) -> Result<EngineConfig> {
    let mut config = load_config(path)?;
    if let Some(profile) = profile {
        if !config.apply_profile(profile) {
            warn!(
                "Profile '{}' has no effect: pool.learners is set explicitly ({} learners)",
                profile.name(),
                config.pool.learners.len()
            );
        }
    }
    Ok(config)
}

fn run_pipeline(
    config: EngineConfig,
    dataset: &Dataset,
    regime: Option<&ensemble_stacker::data::RegimeFeatures>,
) -> Result<StackingReport> {
    let mut pipeline = StackingPipeline::new(config)?;
    pipeline.run_dataset(dataset, regime).map_err(|e| {
        if e.is_data_insufficiency() {
            warn!("No model published: {}", e);
        }
        anyhow!(e)
    })
}

fn finish(report: &StackingReport, output: Option<&Path>) -> Result<()> {
    report.print_summary();
    if let Some(path) = output {
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write report to {:?}", path))?;
        info!("Report written to {:?}", path);
    }
    Ok(())
}

fn print_fold_plan(config: &EngineConfig, rows: usize) -> Result<()> {
    let folds = generate_folds(rows, config.folds.n_folds, config.folds.embargo)?;
    println!("\n{}", "=".repeat(60));
    println!(
        "FOLD PLAN: {} rows, {} folds, embargo {}",
        rows, config.folds.n_folds, config.folds.embargo
    );
    println!("{}", "-".repeat(60));
    for fold in &folds {
        let admitted = config.pool.admits(fold);
        println!(
            "  Fold {}: train [0, {}), validate [{}, {}) {} rows{}",
            fold.fold_id,
            fold.train_end,
            fold.validation_start,
            fold.validation_end,
            fold.validation_len(),
            if admitted { "" } else { "  (below minimum, skipped)" }
        );
    }
    println!("{}", "=".repeat(60));
    Ok(())
}
