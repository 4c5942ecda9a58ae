//! Versioned model artifacts on disk.
//!
//! Each training run writes two immutable files named by its version:
//! `fraud_model_<version>.json` (model and metadata) and
//! `category_encoding_<version>.json`. The `latest.json` alias names the
//! current version and is replaced with a single rename, so a reader
//! resolves either the old pair or the new pair, never a mix.

use crate::error::{FraudError, Result};
use crate::feature_extractor::{CategoryEncoding, FeatureVector};
use crate::metrics::EvaluationMetrics;
use crate::models::gbm::{BoosterParams, FitReport, GradientBoostedTrees};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

const MODEL_PREFIX: &str = "fraud_model_";
const ENCODING_PREFIX: &str = "category_encoding_";
const LATEST_ALIAS: &str = "latest.json";

/// Training provenance and evaluation recorded with a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Timestamp-derived version, also used in file names
    pub version: String,
    pub trained_at: DateTime<Utc>,
    /// Feature names in the order the model expects them
    pub feature_order: Vec<String>,
    pub encoding_version: String,
    /// Weight applied to positive samples during training
    pub positive_weight: f64,
    pub training_samples: usize,
    pub positive_samples: usize,
    pub params: BoosterParams,
    pub fit: FitReport,
    pub evaluation: EvaluationMetrics,
    /// Normalized gain importance, descending
    pub feature_importance: Vec<(String, f64)>,
    /// Data-quality concerns raised during training
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Trained classifier with the encoding it was trained against.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    pub metadata: ArtifactMetadata,
    pub model: GradientBoostedTrees,
    pub encoding: CategoryEncoding,
}

impl ModelArtifact {
    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Fraud-class probability for a vector built with this artifact's encoding.
    pub fn predict_proba(&self, features: &FeatureVector) -> Result<f64> {
        if features.encoding_version != self.metadata.encoding_version {
            return Err(FraudError::SchemaMismatch {
                expected: format!("encoding {}", self.metadata.encoding_version),
                found: format!("encoding {}", features.encoding_version),
            });
        }
        self.model.predict_proba(features.as_slice())
    }

    /// Check the parts of the artifact belong together.
    pub fn verify(&self) -> Result<()> {
        self.model.validate()?;
        self.encoding.verify()?;
        if self.encoding.version() != self.metadata.encoding_version {
            return Err(FraudError::SchemaMismatch {
                expected: format!("encoding {}", self.metadata.encoding_version),
                found: format!("encoding {}", self.encoding.version()),
            });
        }
        if self.model.n_features() != self.metadata.feature_order.len() {
            return Err(FraudError::SchemaMismatch {
                expected: format!("{} features", self.metadata.feature_order.len()),
                found: format!("{} features", self.model.n_features()),
            });
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct ModelFile {
    metadata: ArtifactMetadata,
    model: GradientBoostedTrees,
}

#[derive(Debug, Serialize, Deserialize)]
struct LatestAlias {
    version: String,
    model_file: String,
    encoding_file: String,
    updated_at: DateTime<Utc>,
}

/// Paths written for one saved artifact
#[derive(Debug, Clone)]
pub struct SavedArtifact {
    pub version: String,
    pub model_path: PathBuf,
    pub encoding_path: PathBuf,
}

/// Directory of versioned artifacts plus the `latest` alias.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn model_file(version: &str) -> String {
        format!("{}{}.json", MODEL_PREFIX, version)
    }

    fn encoding_file(version: &str) -> String {
        format!("{}{}.json", ENCODING_PREFIX, version)
    }

    pub fn model_path(&self, version: &str) -> PathBuf {
        self.dir.join(Self::model_file(version))
    }

    pub fn encoding_path(&self, version: &str) -> PathBuf {
        self.dir.join(Self::encoding_file(version))
    }

    /// Persist an artifact under its version and point `latest` at it.
    ///
    /// Fails with `AlreadyExists` if that version is already present, even
    /// when another save of the same version races this one; versioned files
    /// are never overwritten.
    pub fn save(&self, artifact: &ModelArtifact) -> Result<SavedArtifact> {
        artifact.verify()?;
        fs::create_dir_all(&self.dir)?;

        let version = artifact.version().to_string();
        let model_path = self.model_path(&version);
        let encoding_path = self.encoding_path(&version);
        let already_exists = || {
            FraudError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("artifact version {} already exists", version),
            ))
        };
        if model_path.exists() || encoding_path.exists() {
            return Err(already_exists());
        }

        let model_bytes = serde_json::to_vec(&ModelFile {
            metadata: artifact.metadata.clone(),
            model: artifact.model.clone(),
        })?;
        // the encoding claims the version; a concurrent save of the same one loses here
        let encoding_bytes = serde_json::to_vec_pretty(&artifact.encoding)?;
        let claimed = write_new(&encoding_path, &encoding_bytes);
        match claimed {
            Err(FraudError::Io(e)) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(already_exists())
            }
            other => other?,
        }
        write_new(&model_path, &model_bytes)?;

        let alias = LatestAlias {
            version: version.clone(),
            model_file: Self::model_file(&version),
            encoding_file: Self::encoding_file(&version),
            updated_at: Utc::now(),
        };
        write_atomic(&self.dir.join(LATEST_ALIAS), &serde_json::to_vec_pretty(&alias)?)?;

        info!(
            version = %version,
            model = %model_path.display(),
            encoding = %encoding_path.display(),
            "Artifact saved and promoted to latest"
        );

        Ok(SavedArtifact {
            version,
            model_path,
            encoding_path,
        })
    }

    /// Version the `latest` alias points at, if any
    pub fn latest_version(&self) -> Result<Option<String>> {
        match fs::read(self.dir.join(LATEST_ALIAS)) {
            Ok(bytes) => {
                let alias: LatestAlias = serde_json::from_slice(&bytes)?;
                Ok(Some(alias.version))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load the artifact the `latest` alias points at.
    pub fn load_latest(&self) -> Result<ModelArtifact> {
        let alias_path = self.dir.join(LATEST_ALIAS);
        let bytes = match fs::read(&alias_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FraudError::ModelUnavailable(format!(
                    "no trained model in {}",
                    self.dir.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };
        let alias: LatestAlias = serde_json::from_slice(&bytes)?;
        debug!(version = %alias.version, "Resolved latest artifact");

        self.load_files(
            &self.dir.join(&alias.model_file),
            &self.dir.join(&alias.encoding_file),
        )
    }

    /// Load a specific version.
    pub fn load_version(&self, version: &str) -> Result<ModelArtifact> {
        self.load_files(&self.model_path(version), &self.encoding_path(version))
    }

    fn load_files(&self, model_path: &Path, encoding_path: &Path) -> Result<ModelArtifact> {
        let model_bytes = read_artifact_file(model_path)?;
        let encoding_bytes = read_artifact_file(encoding_path)?;

        let ModelFile { metadata, model } = serde_json::from_slice(&model_bytes)?;
        let encoding: CategoryEncoding = serde_json::from_slice(&encoding_bytes)?;

        let artifact = ModelArtifact {
            metadata,
            model,
            encoding,
        };
        artifact.verify()?;

        info!(
            version = %artifact.version(),
            trees = artifact.model.n_trees(),
            categories = artifact.encoding.len(),
            "Artifact loaded"
        );
        Ok(artifact)
    }

    /// Persisted versions, newest first
    pub fn list_versions(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(version) = name
                .strip_prefix(MODEL_PREFIX)
                .and_then(|rest| rest.strip_suffix(".json"))
            {
                versions.push(version.to_string());
            }
        }

        // versions are zero-padded timestamps, so lexical order is chronological
        versions.sort_unstable_by(|a, b| b.cmp(a));
        Ok(versions)
    }
}

/// Timestamp version for a new artifact
pub fn new_version(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%S%3fZ").to_string()
}

fn read_artifact_file(path: &Path) -> Result<Vec<u8>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(FraudError::ModelUnavailable(format!(
                "artifact file missing: {}",
                path.display()
            )))
        }
        Err(e) => return Err(e.into()),
    };
    if bytes.is_empty() {
        return Err(FraudError::ModelUnavailable(format!(
            "artifact file is empty: {}",
            path.display()
        )));
    }
    Ok(bytes)
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `bytes` to a fresh temporary sibling of `path` and flush it to disk.
fn write_temp(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            FraudError::invalid_format(format!("bad artifact path {}", path.display()))
        })?;
    let tmp = path.with_file_name(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(tmp)
}

/// Write to a temporary sibling, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = write_temp(path, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Like [`write_atomic`] but fails with `AlreadyExists` instead of replacing
/// an existing file. The hard link publishes the complete file in one step.
fn write_new(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = write_temp(path, bytes)?;
    let linked = fs::hard_link(&tmp, path);
    let _ = fs::remove_file(&tmp);
    linked.map_err(FraudError::from)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dataset::LabeledDataset;
    use crate::feature_extractor::CategoryEncoding;
    use chrono::TimeZone;

    pub(crate) fn tiny_artifact(version: &str) -> ModelArtifact {
        let names: Vec<String> = ["type", "amount"].iter().map(|s| s.to_string()).collect();
        let mut train = LabeledDataset::new(names.clone());
        for i in 0..40 {
            let fraud = i % 4 == 0;
            train.push(vec![if fraud { 1.0 } else { 0.0 }, i as f64], fraud);
        }
        let params = BoosterParams {
            n_estimators: 5,
            early_stopping_rounds: None,
            ..BoosterParams::default()
        };
        let (model, fit) = GradientBoostedTrees::fit(&params, &train, 3.0, None, 42).unwrap();
        let encoding =
            CategoryEncoding::from_categories(vec!["PAYMENT".into(), "CASH_OUT".into()]).unwrap();

        ModelArtifact {
            metadata: ArtifactMetadata {
                version: version.to_string(),
                trained_at: Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap(),
                feature_order: names,
                encoding_version: encoding.version().to_string(),
                positive_weight: 3.0,
                training_samples: 40,
                positive_samples: 10,
                params,
                fit,
                evaluation: EvaluationMetrics::evaluate(&[true, false], &[0.9, 0.1], 0.5),
                feature_importance: Vec::new(),
                warnings: Vec::new(),
            },
            model,
            encoding,
        }
    }

    #[test]
    fn test_save_and_load_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = tiny_artifact("20261016T120000000Z");

        let saved = store.save(&artifact).unwrap();
        assert!(saved.model_path.exists());
        assert!(saved.encoding_path.exists());

        let loaded = store.load_latest().unwrap();
        assert_eq!(loaded, artifact);
        assert_eq!(
            store.latest_version().unwrap().as_deref(),
            Some("20261016T120000000Z")
        );
    }

    #[test]
    fn test_latest_moves_to_newest_and_old_versions_remain() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        store.save(&tiny_artifact("20261016T120000000Z")).unwrap();
        store.save(&tiny_artifact("20261017T080000000Z")).unwrap();

        assert_eq!(store.load_latest().unwrap().version(), "20261017T080000000Z");
        assert_eq!(
            store.list_versions().unwrap(),
            vec!["20261017T080000000Z", "20261016T120000000Z"]
        );
        assert_eq!(
            store.load_version("20261016T120000000Z").unwrap().version(),
            "20261016T120000000Z"
        );
    }

    #[test]
    fn test_versions_are_immutable() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = tiny_artifact("20261016T120000000Z");

        store.save(&artifact).unwrap();
        assert!(matches!(store.save(&artifact), Err(FraudError::Io(_))));
    }

    #[test]
    fn test_no_model_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("missing"));

        assert!(matches!(
            store.load_latest(),
            Err(FraudError::ModelUnavailable(_))
        ));
        assert!(store.list_versions().unwrap().is_empty());
        assert_eq!(store.latest_version().unwrap(), None);
    }

    #[test]
    fn test_empty_model_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save(&tiny_artifact("20261016T120000000Z")).unwrap();
        fs::write(store.model_path("20261016T120000000Z"), b"").unwrap();

        assert!(matches!(
            store.load_latest(),
            Err(FraudError::ModelUnavailable(_))
        ));
    }

    #[test]
    fn test_mismatched_encoding_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save(&tiny_artifact("20261016T120000000Z")).unwrap();

        let other = CategoryEncoding::from_categories(vec!["TRANSFER".into()]).unwrap();
        fs::write(
            store.encoding_path("20261016T120000000Z"),
            serde_json::to_vec(&other).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            store.load_latest(),
            Err(FraudError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_corrupt_tree_structure_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save(&tiny_artifact("20261016T120000000Z")).unwrap();

        let path = store.model_path("20261016T120000000Z");
        let mut file: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        for tree in file["model"]["trees"].as_array_mut().unwrap() {
            for node in tree["nodes"].as_array_mut().unwrap() {
                if node["kind"] == "split" {
                    node["left"] = 9999.into();
                    node["right"] = 9999.into();
                }
            }
        }
        fs::write(&path, serde_json::to_vec(&file).unwrap()).unwrap();

        assert!(matches!(
            store.load_latest(),
            Err(FraudError::ModelUnavailable(_))
        ));
    }

    #[test]
    fn test_concurrent_saves_of_one_version_keep_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = tiny_artifact("20261016T120000000Z");

        let results: Vec<Result<SavedArtifact>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4).map(|_| s.spawn(|| store.save(&artifact))).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for result in results.iter().filter(|r| r.is_err()) {
            match result {
                Err(FraudError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::AlreadyExists),
                other => panic!("expected AlreadyExists, got {:?}", other),
            }
        }
        assert_eq!(store.load_latest().unwrap(), artifact);
    }

    #[test]
    fn test_no_temporary_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save(&tiny_artifact("20261016T120000000Z")).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_new_version_format() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 16, 9, 5, 3).unwrap();
        assert_eq!(new_version(ts), "20261016T090503000Z");
    }
}
