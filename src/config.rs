//! Configuration management for the fraud-risk scoring pipeline

use crate::models::gbm::BoosterParams;
use crate::rules::RuleConfig;
use crate::types::assessment::RiskLevelThresholds;
use anyhow::{bail, Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub training: TrainingConfig,
    pub scoring: ScoringConfig,
    pub logging: LoggingConfig,
}

/// Filesystem locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding versioned artifacts and the `latest` alias
    pub models_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
        }
    }
}

/// Training configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Rows read per ingestion chunk
    pub chunk_size: usize,
    /// Fraction of rows held out for evaluation and early stopping
    pub test_fraction: f64,
    /// Seed for the split and row subsampling
    pub seed: u64,
    /// Whether the feature schema carries `step`
    pub include_step: bool,
    /// Below this many rows a data-quality warning is raised
    pub min_samples: usize,
    /// Below this many fraud rows a data-quality warning is raised
    pub min_positive_samples: usize,
    /// Booster hyperparameters
    pub model: BoosterParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100_000,
            test_fraction: 0.3,
            seed: 42,
            include_step: true,
            min_samples: 1_000,
            min_positive_samples: 10,
            model: BoosterParams::default(),
        }
    }
}

/// Scoring configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ScoringConfig {
    /// Risk level classification thresholds
    pub risk_levels: RiskLevelThresholds,
    /// Advisory rule parameters
    pub rules: RuleConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let training = &self.training;
        if !(training.test_fraction > 0.0 && training.test_fraction < 1.0) {
            bail!(
                "training.test_fraction must be in (0, 1), got {}",
                training.test_fraction
            );
        }
        if training.chunk_size == 0 {
            bail!("training.chunk_size must be positive");
        }
        training
            .model
            .validate()
            .map_err(|e| anyhow::anyhow!("training.model: {}", e))?;

        let levels = &self.scoring.risk_levels;
        if !(0.0..=1.0).contains(&levels.medium) || !(0.0..=1.0).contains(&levels.high) {
            bail!("scoring.risk_levels must lie in [0, 1]");
        }
        if levels.medium > levels.high {
            bail!(
                "scoring.risk_levels.medium ({}) exceeds high ({})",
                levels.medium,
                levels.high
            );
        }

        match self.logging.format.as_str() {
            "json" | "pretty" => Ok(()),
            other => bail!("logging.format must be json or pretty, got {}", other),
        }
    }
}
