//! Offline training: labeled dataset in, versioned artifact out.
//!
//! CSV input is read twice in bounded chunks. The first pass collects the
//! category set so the encoding covers the whole file; the second encodes
//! each chunk as it arrives. Only encoded rows are held in memory.

use crate::config::{AppConfig, TrainingConfig};
use crate::dataset::{CsvSource, LabeledDataset};
use crate::error::{FraudError, Result};
use crate::feature_extractor::{CategoryEncoding, EncodingBuilder, FeatureCodec, FeatureSchema};
use crate::metrics::EvaluationMetrics;
use crate::models::artifact::{
    new_version, ArtifactMetadata, ArtifactStore, ModelArtifact, SavedArtifact,
};
use crate::models::gbm::GradientBoostedTrees;
use crate::types::transaction::TransactionRecord;
use chrono::Utc;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};

/// Probability cut-off for the confusion matrix in the evaluation report
const DECISION_THRESHOLD: f64 = 0.5;

/// Result of a successful training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub saved: SavedArtifact,
}

impl TrainingOutcome {
    pub fn version(&self) -> &str {
        self.artifact.version()
    }

    pub fn evaluation(&self) -> &EvaluationMetrics {
        &self.artifact.metadata.evaluation
    }
}

/// Trains a classifier and persists it with its encoding.
pub struct TrainingPipeline {
    config: TrainingConfig,
    codec: FeatureCodec,
    store: ArtifactStore,
    base_encoding: Option<CategoryEncoding>,
}

impl TrainingPipeline {
    pub fn new(config: TrainingConfig, store: ArtifactStore) -> Self {
        let codec = FeatureCodec::new(FeatureSchema::new(config.include_step));
        Self {
            config,
            codec,
            store,
            base_encoding: None,
        }
    }

    /// Reuse the codes of an earlier encoding, typically the previous
    /// artifact's. Categories it lacks are appended after the existing ones.
    pub fn with_encoding(mut self, encoding: CategoryEncoding) -> Self {
        self.base_encoding = Some(encoding);
        self
    }

    fn encoding_builder(&self) -> EncodingBuilder {
        match &self.base_encoding {
            Some(base) => EncodingBuilder::extending(base),
            None => EncodingBuilder::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.training.clone(),
            ArtifactStore::new(&config.paths.models_dir),
        )
    }

    pub fn codec(&self) -> &FeatureCodec {
        &self.codec
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Train from a CSV file.
    pub fn train_from_csv<P: AsRef<Path>>(&self, path: P) -> Result<TrainingOutcome> {
        let path = path.as_ref();
        let result = self.load_csv(path).and_then(|(dataset, encoding)| {
            self.train_dataset(dataset, encoding)
        });
        if let Err(e) = &result {
            error!(path = %path.display(), error = %e, "Training run failed");
        }
        result
    }

    /// Train from records already in memory. Every record must carry a label.
    pub fn train_records(&self, records: &[TransactionRecord]) -> Result<TrainingOutcome> {
        if records.is_empty() {
            return Err(FraudError::EmptyDataset);
        }
        let mut builder = self.encoding_builder();
        for record in records {
            builder.observe(&record.tx_type);
        }
        let encoding = builder.build()?;

        let mut dataset = LabeledDataset::new(self.codec.feature_names());
        for (i, record) in records.iter().enumerate() {
            let label = record.is_fraud.ok_or_else(|| {
                FraudError::invalid_format(format!("record {} has no fraud label", i))
            })?;
            let features = self.codec.encode(&record.clone().without_identifiers(), &encoding)?;
            dataset.push(features.values, label);
        }

        self.train_dataset(dataset, encoding)
    }

    fn load_csv(&self, path: &Path) -> Result<(LabeledDataset, CategoryEncoding)> {
        let source = CsvSource::open(path, self.config.chunk_size)?;
        if self.codec.schema().include_step && !source.has_step() {
            return Err(FraudError::SchemaMismatch {
                expected: self.codec.feature_names().join(","),
                found: format!("{} without a step column", path.display()),
            });
        }
        let started = Instant::now();

        let mut builder = self.encoding_builder();
        for chunk in source.chunks()? {
            for record in chunk? {
                builder.observe(&record.tx_type);
            }
        }
        let encoding = builder.build()?;
        info!(
            categories = ?encoding.categories(),
            encoding_version = %encoding.version(),
            "Category encoding built"
        );

        let mut dataset = LabeledDataset::new(self.codec.feature_names());
        let mut chunks = 0usize;
        for chunk in source.chunks()? {
            for record in chunk? {
                let label = record.is_fraud.unwrap_or(false);
                let features = self.codec.encode(&record, &encoding)?;
                dataset.push(features.values, label);
            }
            chunks += 1;
        }

        info!(
            path = %path.display(),
            rows = dataset.len(),
            chunks = chunks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Dataset loaded"
        );
        Ok((dataset, encoding))
    }

    fn data_quality_warnings(&self, dataset: &LabeledDataset) -> Vec<String> {
        let counts = dataset.class_counts();
        let mut warnings = Vec::new();
        if dataset.len() < self.config.min_samples {
            warnings.push(format!(
                "only {} training rows (recommended at least {})",
                dataset.len(),
                self.config.min_samples
            ));
        }
        if counts.positives < self.config.min_positive_samples {
            warnings.push(format!(
                "only {} fraud rows (recommended at least {})",
                counts.positives, self.config.min_positive_samples
            ));
        }
        for warning in &warnings {
            warn!(warning = %warning, "Low-confidence training data");
        }
        warnings
    }

    fn train_dataset(
        &self,
        dataset: LabeledDataset,
        encoding: CategoryEncoding,
    ) -> Result<TrainingOutcome> {
        if dataset.is_empty() {
            return Err(FraudError::EmptyDataset);
        }
        let counts = dataset.class_counts();
        if counts.negatives == 0 {
            return Err(FraudError::InsufficientData(format!(
                "no legitimate samples among {} records",
                counts.total()
            )));
        }
        // rejects an empty fraud class before anything is split
        counts.imbalance_weight()?;
        info!(
            rows = counts.total(),
            legitimate = counts.negatives,
            fraud = counts.positives,
            "Class distribution"
        );

        let warnings = self.data_quality_warnings(&dataset);

        let split = dataset.stratified_split(self.config.test_fraction, self.config.seed);
        let train_counts = split.train.class_counts();
        let positive_weight = train_counts.imbalance_weight()?;
        info!(
            train_rows = split.train.len(),
            test_rows = split.test.len(),
            positive_weight = positive_weight,
            "Stratified split"
        );

        let validation = (!split.test.is_empty()).then_some(&split.test);
        let (model, fit) = GradientBoostedTrees::fit(
            &self.config.model,
            &split.train,
            positive_weight,
            validation,
            self.config.seed,
        )?;

        let eval_set = validation.unwrap_or(&split.train);
        let probabilities = eval_set
            .features
            .iter()
            .map(|row| model.predict_proba(row))
            .collect::<Result<Vec<f64>>>()?;
        let evaluation =
            EvaluationMetrics::evaluate(&eval_set.labels, &probabilities, DECISION_THRESHOLD);
        evaluation.log_summary();

        let feature_importance = model.feature_importance(&dataset.feature_names);
        for (name, share) in feature_importance.iter().take(3) {
            info!(feature = %name, importance = share, "Top feature");
        }

        let trained_at = Utc::now();
        let artifact = ModelArtifact {
            metadata: ArtifactMetadata {
                version: new_version(trained_at),
                trained_at,
                feature_order: dataset.feature_names.clone(),
                encoding_version: encoding.version().to_string(),
                positive_weight,
                training_samples: split.train.len(),
                positive_samples: train_counts.positives,
                params: self.config.model.clone(),
                fit,
                evaluation,
                feature_importance,
                warnings,
            },
            model,
            encoding,
        };

        let saved = self.store.save(&artifact).map_err(|e| {
            error!(error = %e, dir = %self.store.dir().display(), "Failed to persist artifact");
            e
        })?;

        Ok(TrainingOutcome { artifact, saved })
    }
}
