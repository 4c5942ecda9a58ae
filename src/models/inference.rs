//! Scoring engine: one transaction in, one risk assessment out

use crate::config::AppConfig;
use crate::error::{FraudError, Result};
use crate::feature_extractor::{FeatureCodec, FeatureSchema};
use crate::models::artifact::{ArtifactStore, ModelArtifact};
use crate::rules::RiskRules;
use crate::types::assessment::{RiskAssessment, RiskLevel, RiskLevelThresholds};
use crate::types::transaction::TransactionRecord;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Scores transactions against a loaded artifact.
///
/// The artifact is held behind an `Arc` and replaced as a whole on reload;
/// a request in flight keeps the snapshot it started with.
pub struct ScoringEngine {
    codec: FeatureCodec,
    thresholds: RiskLevelThresholds,
    rules: RiskRules,
    artifact: RwLock<Arc<ModelArtifact>>,
}

impl ScoringEngine {
    pub fn new(
        artifact: ModelArtifact,
        codec: FeatureCodec,
        thresholds: RiskLevelThresholds,
        rules: RiskRules,
    ) -> Self {
        info!(
            version = %artifact.version(),
            features = codec.feature_count(),
            medium = thresholds.medium,
            high = thresholds.high,
            "Scoring engine initialized"
        );
        Self {
            codec,
            thresholds,
            rules,
            artifact: RwLock::new(Arc::new(artifact)),
        }
    }

    /// Build an engine from configuration, loading the latest artifact.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store = ArtifactStore::new(&config.paths.models_dir);
        let artifact = store.load_latest()?;
        Ok(Self::with_config(config, artifact))
    }

    /// Build an engine from configuration around a given artifact.
    pub fn with_config(config: &AppConfig, artifact: ModelArtifact) -> Self {
        Self::new(
            artifact,
            FeatureCodec::new(FeatureSchema::new(config.training.include_step)),
            config.scoring.risk_levels.clone(),
            RiskRules::new(config.scoring.rules.clone()),
        )
    }

    pub fn codec(&self) -> &FeatureCodec {
        &self.codec
    }

    pub fn thresholds(&self) -> &RiskLevelThresholds {
        &self.thresholds
    }

    /// Current artifact snapshot
    pub fn artifact(&self) -> Arc<ModelArtifact> {
        self.artifact
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Swap in a new artifact. Requests already running finish on the old one.
    pub fn reload(&self, artifact: ModelArtifact) -> Result<()> {
        artifact.verify()?;
        let next = Arc::new(artifact);
        let previous = {
            let mut slot = self
                .artifact
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::replace(&mut *slot, next)
        };
        info!(
            previous = %previous.version(),
            current = %self.artifact().version(),
            "Artifact reloaded"
        );
        Ok(())
    }

    /// Reload from the store's `latest` alias; returns the new version.
    pub fn reload_latest(&self, store: &ArtifactStore) -> Result<String> {
        let artifact = store.load_latest()?;
        let version = artifact.version().to_string();
        self.reload(artifact)?;
        Ok(version)
    }

    /// Score one record with the current artifact.
    pub fn score(&self, record: &TransactionRecord) -> Result<RiskAssessment> {
        let artifact = self.artifact();
        self.assess(record, &artifact)
    }

    /// Score several records against one artifact snapshot.
    pub fn score_batch(&self, records: &[TransactionRecord]) -> Vec<Result<RiskAssessment>> {
        let artifact = self.artifact();
        records
            .iter()
            .map(|record| self.assess(record, &artifact))
            .collect()
    }

    /// Score one record with an explicit artifact. Pure in its inputs.
    pub fn assess(
        &self,
        record: &TransactionRecord,
        artifact: &ModelArtifact,
    ) -> Result<RiskAssessment> {
        let expected = &artifact.metadata.feature_order;
        let actual = self.codec.feature_names();
        if *expected != actual {
            return Err(FraudError::SchemaMismatch {
                expected: expected.join(","),
                found: actual.join(","),
            });
        }

        let features = self.codec.encode(record, &artifact.encoding)?;
        let fraud_probability = artifact.predict_proba(&features)?;
        let risk_level = RiskLevel::from_probability(fraud_probability, &self.thresholds);

        let risk_factors = self.rules.risk_factors(record);
        let validation = self.rules.validate(record);

        debug!(
            tx_type = %record.tx_type,
            fraud_probability = fraud_probability,
            risk_level = %risk_level,
            factors = risk_factors.len(),
            model_version = %artifact.version(),
            "Transaction scored"
        );

        Ok(RiskAssessment {
            fraud_probability,
            risk_level,
            recommendation: risk_level.recommendation(),
            risk_factors,
            validation,
            model_version: artifact.version().to_string(),
        })
    }
}
