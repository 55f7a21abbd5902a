//! SiteGrade CLI
//!
//! Batch entry points for generating datasets, training and publishing
//! models, and grading pages against the published model.

mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{dataset, model, predict, train};
use grader_lib::dataset::GenerationMode;
use grader_lib::{PipelineConfig, PipelineMetrics};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// SiteGrade page performance grading CLI
#[derive(Parser)]
#[command(name = "sitegrade")]
#[command(author, version, about = "CLI for SiteGrade page performance grading", long_about = None)]
pub struct Cli {
    /// Pipeline config file, TOML, JSON or YAML (can also be set via SITEGRADE_CONFIG)
    #[arg(long, env = "SITEGRADE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Print Prometheus metrics when the command finishes
    #[arg(long)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a labeled synthetic dataset as CSV
    GenerateDataset {
        /// Output CSV path
        #[arg(long, short)]
        output: PathBuf,

        /// Number of rows to generate
        #[arg(long)]
        samples: Option<usize>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Generation mode (balanced, organic)
        #[arg(long)]
        mode: Option<GenerationMode>,
    },

    /// Train a classifier and publish it as the current model release
    TrainModel {
        /// Labeled dataset CSV
        #[arg(long, short)]
        dataset: Option<PathBuf>,

        /// Model release store directory
        #[arg(long)]
        artifact_dir: Option<PathBuf>,

        /// Number of trees
        #[arg(long)]
        trees: Option<usize>,

        /// Maximum tree depth
        #[arg(long)]
        max_depth: Option<usize>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Skip minority oversampling of the training fold
        #[arg(long)]
        no_balance: bool,

        /// Prune older releases, keeping this many besides the current one
        #[arg(long)]
        keep_releases: Option<usize>,
    },

    /// Grade a page from its metrics
    Predict {
        /// Model release store directory
        #[arg(long)]
        artifact_dir: Option<PathBuf>,

        /// JSON object of metric name to value, or - to read stdin
        #[arg(long, short)]
        input: Option<String>,

        /// Single metric as name=value (repeatable, overrides --input)
        #[arg(long = "metric", value_name = "NAME=VALUE")]
        metric: Vec<String>,
    },

    /// Show row count, columns and class distribution of a dataset
    InspectDataset {
        /// Dataset CSV path
        path: PathBuf,
    },

    /// Show the published model release
    ShowModel {
        /// Model release store directory
        #[arg(long)]
        artifact_dir: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    if let Err(e) = run(cli) {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let format = cli.format;
    let mut config =
        PipelineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::GenerateDataset {
            output,
            samples,
            seed,
            mode,
        } => {
            if let Some(samples) = samples {
                config.samples = samples;
            }
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if let Some(mode) = mode {
                config.generation_mode = mode;
            }
            dataset::generate_dataset(&config, &output, format)?;
        }
        Commands::TrainModel {
            dataset,
            artifact_dir,
            trees,
            max_depth,
            seed,
            no_balance,
            keep_releases,
        } => {
            if dataset.is_some() {
                config.dataset_path = dataset;
            }
            if let Some(dir) = artifact_dir {
                config.artifact_dir = dir;
            }
            if let Some(trees) = trees {
                config.n_trees = trees;
            }
            if let Some(depth) = max_depth {
                config.max_depth = depth;
            }
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if no_balance {
                config.balance = false;
            }
            config.validate().context("Invalid training options")?;
            train::train_model(&config, keep_releases, format)?;
        }
        Commands::Predict {
            artifact_dir,
            input,
            metric,
        } => {
            if let Some(dir) = artifact_dir {
                config.artifact_dir = dir;
            }
            predict::predict(
                &config.store(),
                config.low_confidence_threshold,
                input.as_deref(),
                &metric,
                format,
            )?;
        }
        Commands::InspectDataset { path } => {
            dataset::inspect_dataset(&path, format)?;
        }
        Commands::ShowModel { artifact_dir } => {
            if let Some(dir) = artifact_dir {
                config.artifact_dir = dir;
            }
            model::show_model(&config.store(), format)?;
        }
    }

    if cli.metrics {
        print!("{}", PipelineMetrics::new().render());
    }

    Ok(())
}
