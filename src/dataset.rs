//! Labeled dataset ingestion and splitting.
//!
//! CSV input is read in bounded chunks so peak memory depends on the chunk
//! size, not on the file size. Identifier columns (`nameOrig`, `nameDest`,
//! `isFlaggedFraud`) are accepted in the file but never reach the features.

use crate::error::{FraudError, Result};
use crate::types::transaction::TransactionRecord;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Columns every dataset must carry
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "type",
    "amount",
    "oldbalanceOrg",
    "newbalanceOrg",
    "oldbalanceDest",
    "newbalanceDest",
];

/// Training label column
pub const LABEL_COLUMN: &str = "isFraud";

/// Optional ordinal time column
pub const STEP_COLUMN: &str = "step";

/// Columns accepted in the file and dropped before feature extraction
pub const IDENTIFIER_COLUMNS: [&str; 3] = ["nameOrig", "nameDest", "isFlaggedFraud"];

/// A labeled CSV file read chunk by chunk.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    chunk_size: usize,
    headers: Vec<String>,
}

impl CsvSource {
    /// Open a dataset and validate its header.
    pub fn open<P: AsRef<Path>>(path: P, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(FraudError::InputNotFound(path.to_path_buf()));
        }
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if !is_csv {
            return Err(FraudError::invalid_format(format!(
                "only CSV files are supported: {}",
                path.display()
            )));
        }
        if chunk_size == 0 {
            return Err(FraudError::invalid_format("chunk size must be positive"));
        }

        let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .chain(std::iter::once(&LABEL_COLUMN))
            .filter(|c| !headers.iter().any(|h| h == *c))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(FraudError::invalid_format(format!(
                "{} is missing required columns: {}",
                path.display(),
                missing.join(", ")
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            chunk_size,
            headers,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Whether the file carries the optional `step` column
    pub fn has_step(&self) -> bool {
        self.headers.iter().any(|h| h == STEP_COLUMN)
    }

    /// Start a fresh pass over the file.
    pub fn chunks(&self) -> Result<ChunkReader> {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(csv_error)?;
        Ok(ChunkReader {
            rows: reader.into_deserialize(),
            chunk_size: self.chunk_size,
            row: 0,
            chunk: 0,
            failed: false,
        })
    }
}

/// Iterator over chunks of at most `chunk_size` validated, labeled records
/// with identifiers removed. Stops after the first error.
pub struct ChunkReader {
    rows: csv::DeserializeRecordsIntoIter<File, TransactionRecord>,
    chunk_size: usize,
    row: usize,
    chunk: usize,
    failed: bool,
}

impl ChunkReader {
    fn next_record(&mut self) -> Option<Result<TransactionRecord>> {
        let parsed = self.rows.next()?;
        self.row += 1;
        // header is line 1
        let line = self.row + 1;

        let record = match parsed {
            Ok(record) => record,
            Err(e) => {
                return Some(Err(match csv_error(e) {
                    FraudError::InvalidFormat(msg) => {
                        FraudError::invalid_format(format!("line {}: {}", line, msg))
                    }
                    other => other,
                }))
            }
        };

        if record.is_fraud.is_none() {
            return Some(Err(FraudError::invalid_format(format!(
                "line {}: missing {} label",
                line, LABEL_COLUMN
            ))));
        }
        if let Err(FraudError::InvalidFormat(msg)) = record.validate() {
            return Some(Err(FraudError::invalid_format(format!("line {}: {}", line, msg))));
        }

        Some(Ok(record.without_identifiers()))
    }
}

impl Iterator for ChunkReader {
    type Item = Result<Vec<TransactionRecord>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let mut chunk = Vec::with_capacity(self.chunk_size.min(8192));
        while chunk.len() < self.chunk_size {
            match self.next_record() {
                Some(Ok(record)) => chunk.push(record),
                Some(Err(e)) => {
                    self.failed = true;
                    return Some(Err(e));
                }
                None => break,
            }
        }

        if chunk.is_empty() {
            return None;
        }
        self.chunk += 1;
        debug!(chunk = self.chunk, rows = chunk.len(), "Read dataset chunk");
        Some(Ok(chunk))
    }
}

fn csv_error(e: csv::Error) -> FraudError {
    match e.into_kind() {
        csv::ErrorKind::Io(err) => FraudError::Io(err),
        other => FraudError::invalid_format(csv_kind_message(other)),
    }
}

fn csv_kind_message(kind: csv::ErrorKind) -> String {
    match kind {
        csv::ErrorKind::Deserialize { err, .. } => err.to_string(),
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => format!("expected {} fields, found {}", expected_len, len),
        csv::ErrorKind::Utf8 { err, .. } => err.to_string(),
        other => format!("{:?}", other),
    }
}

/// Class sizes of a labeled set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassCounts {
    pub negatives: usize,
    pub positives: usize,
}

impl ClassCounts {
    pub fn from_labels(labels: &[bool]) -> Self {
        let positives = labels.iter().filter(|&&l| l).count();
        Self {
            negatives: labels.len() - positives,
            positives,
        }
    }

    pub fn total(&self) -> usize {
        self.negatives + self.positives
    }

    /// Weight applied to each positive sample: `negatives / max(1, positives)`.
    ///
    /// An empty positive class cannot be corrected for and is rejected.
    pub fn imbalance_weight(&self) -> Result<f64> {
        if self.positives == 0 {
            return Err(FraudError::InsufficientData(format!(
                "no positive (fraud) samples among {} records",
                self.total()
            )));
        }
        Ok(self.negatives as f64 / self.positives.max(1) as f64)
    }
}

/// Encoded features with their labels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledDataset {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<bool>,
    pub feature_names: Vec<String>,
}

/// Train/test split result
#[derive(Debug, Clone)]
pub struct Split {
    pub train: LabeledDataset,
    pub test: LabeledDataset,
}

impl LabeledDataset {
    pub fn new(feature_names: Vec<String>) -> Self {
        Self {
            features: Vec::new(),
            labels: Vec::new(),
            feature_names,
        }
    }

    pub fn push(&mut self, features: Vec<f64>, label: bool) {
        debug_assert_eq!(features.len(), self.feature_names.len());
        self.features.push(features);
        self.labels.push(label);
    }

    /// Append another dataset with the same feature layout
    pub fn extend(&mut self, other: LabeledDataset) {
        self.features.extend(other.features);
        self.labels.extend(other.labels);
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn class_counts(&self) -> ClassCounts {
        ClassCounts::from_labels(&self.labels)
    }

    fn subset(&self, indices: &[usize]) -> Self {
        Self {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            feature_names: self.feature_names.clone(),
        }
    }

    /// Shuffle each class with a seeded RNG and hold out `test_fraction` of it.
    ///
    /// A class with at least two members always contributes to both sides.
    pub fn stratified_split(&self, test_fraction: f64, seed: u64) -> Split {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut train_idx = Vec::with_capacity(self.len());
        let mut test_idx = Vec::new();

        for class in [false, true] {
            let mut members: Vec<usize> = (0..self.len())
                .filter(|&i| self.labels[i] == class)
                .collect();
            members.shuffle(&mut rng);

            let n = members.len();
            let mut n_test = (n as f64 * test_fraction).round() as usize;
            if n >= 2 {
                n_test = n_test.clamp(1, n - 1);
            } else {
                n_test = n_test.min(n);
            }

            test_idx.extend_from_slice(&members[..n_test]);
            train_idx.extend_from_slice(&members[n_test..]);
        }

        train_idx.sort_unstable();
        test_idx.sort_unstable();

        Split {
            train: self.subset(&train_idx),
            test: self.subset(&test_idx),
        }
    }
}
