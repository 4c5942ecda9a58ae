//! Fraud-Risk Scoring - Command Line Entry Point
//!
//! Trains a model from a labeled CSV, scores transactions given as JSON, and
//! lists the persisted model versions.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fraud_risk_scoring::{
    config::{AppConfig, LoggingConfig},
    models::{ArtifactStore, ScoringEngine},
    training::TrainingPipeline,
    types::{RiskAssessment, TransactionRecord},
};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fraud-risk")]
#[command(about = "Fraud-risk model training and transaction scoring", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to config/config.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the artifact directory
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model from a labeled CSV dataset
    Train {
        /// Dataset path
        #[arg(short, long)]
        data: PathBuf,
    },

    /// Score transactions from a JSON file (object or array), or "-" for stdin
    Score {
        #[arg(short, long, default_value = "-")]
        input: String,

        /// Score against a specific version instead of latest
        #[arg(long)]
        version: Option<String>,
    },

    /// List persisted model versions, newest first
    Versions,
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!("fraud_risk_scoring={0},fraud_risk={0}", logging.level))
    })?;

    // stdout carries command output; logs go to stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from_path(path)
            .with_context(|| format!("Failed to load {}", path.display())),
        None if Path::new("config/config.toml").is_file() => AppConfig::load(),
        None => Ok(AppConfig::default()),
    }
}

fn read_records(input: &str) -> Result<Vec<TransactionRecord>> {
    let raw = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {}", input))?
    };

    let value: serde_json::Value = serde_json::from_str(&raw).context("Input is not valid JSON")?;
    let records = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(records)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(dir) = cli.models_dir {
        config.paths.models_dir = dir;
    }
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Train { data } => {
            info!(
                data = %data.display(),
                models_dir = %config.paths.models_dir.display(),
                "Starting training run"
            );
            let pipeline = TrainingPipeline::from_config(&config);
            let outcome = pipeline.train_from_csv(&data)?;

            let metadata = &outcome.artifact.metadata;
            if !metadata.warnings.is_empty() {
                warn!(count = metadata.warnings.len(), "Model trained on low-confidence data");
            }
            println!("Trained model version {}", outcome.version());
            println!("  model:    {}", outcome.saved.model_path.display());
            println!("  encoding: {}", outcome.saved.encoding_path.display());
            println!(
                "  rounds:   {} trained, {} kept",
                metadata.fit.rounds_trained,
                outcome.artifact.model.n_trees()
            );
            println!("  weight:   {:.4}", metadata.positive_weight);
            println!("{}", serde_json::to_string_pretty(outcome.evaluation())?);
            println!("Feature importance:");
            for (name, share) in &metadata.feature_importance {
                println!("  {:<16} {:.4}", name, share);
            }
        }

        Commands::Score { input, version } => {
            let engine = match version {
                Some(version) => {
                    let artifact =
                        ArtifactStore::new(&config.paths.models_dir).load_version(&version)?;
                    ScoringEngine::with_config(&config, artifact)
                }
                None => ScoringEngine::from_config(&config)?,
            };
            let records = read_records(&input)?;

            let assessments = engine
                .score_batch(&records)
                .into_iter()
                .collect::<fraud_risk_scoring::Result<Vec<RiskAssessment>>>()?;
            let output = if assessments.len() == 1 {
                serde_json::to_string_pretty(&assessments[0])?
            } else {
                serde_json::to_string_pretty(&assessments)?
            };
            println!("{}", output);
        }

        Commands::Versions => {
            let store = ArtifactStore::new(&config.paths.models_dir);
            let latest = store.latest_version()?;
            let versions = store.list_versions()?;
            if versions.is_empty() {
                println!("No models in {}", store.dir().display());
            }
            for version in versions {
                let marker = if latest.as_deref() == Some(version.as_str()) {
                    " (latest)"
                } else {
                    ""
                };
                println!("{}{}", version, marker);
            }
        }
    }

    Ok(())
}
