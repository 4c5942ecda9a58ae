//! Feature encoding shared by training and scoring.
//!
//! A transaction is turned into a fixed-order numeric vector:
//! `[step?, type, amount, oldbalanceOrg, newbalanceOrg, oldbalanceDest, newbalanceDest]`.
//! `step` is present only when the [`FeatureSchema`] declares it. The
//! categorical `type` is replaced by its code in a [`CategoryEncoding`]
//! built once at training time and persisted next to the model, so both
//! paths produce identical vectors.
//!
//! Absent numeric values are encoded as `0.0`. This is lossy: a missing
//! balance and a zero balance look the same to the model.

use crate::error::{FraudError, Result};
use crate::types::transaction::TransactionRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Feature names after the optional `step`, in encoding order.
const BASE_FEATURES: [&str; 6] = [
    "type",
    "amount",
    "oldbalanceOrg",
    "newbalanceOrg",
    "oldbalanceDest",
    "newbalanceDest",
];

/// Declares which optional columns take part in the feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub include_step: bool,
}

impl FeatureSchema {
    pub fn new(include_step: bool) -> Self {
        Self { include_step }
    }

    /// Feature names in vector order
    pub fn feature_names(&self) -> Vec<String> {
        let step = self.include_step.then_some("step");
        step.into_iter()
            .chain(BASE_FEATURES)
            .map(str::to_string)
            .collect()
    }

    pub fn feature_count(&self) -> usize {
        BASE_FEATURES.len() + usize::from(self.include_step)
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self { include_step: true }
    }
}

/// Category name to integer code mapping.
///
/// Codes are positions in `categories`, so they form a bijection onto
/// `0..len()`. `version` is a digest of the ordered category list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEncoding {
    categories: Vec<String>,
    version: String,
}

impl CategoryEncoding {
    /// Build an encoding from categories in code order.
    pub fn from_categories(categories: Vec<String>) -> Result<Self> {
        if categories.is_empty() {
            return Err(FraudError::EmptyDataset);
        }
        for (i, category) in categories.iter().enumerate() {
            if categories[..i].contains(category) {
                return Err(FraudError::invalid_format(format!(
                    "duplicate category '{}' in encoding",
                    category
                )));
            }
        }
        let version = fingerprint(&categories);
        Ok(Self {
            categories,
            version,
        })
    }

    /// Code for a category; unknown categories are an error, never a default.
    pub fn code(&self, category: &str) -> Result<u32> {
        self.categories
            .iter()
            .position(|c| c == category)
            .map(|i| i as u32)
            .ok_or_else(|| FraudError::UnknownCategory(category.to_string()))
    }

    /// Category for a code
    pub fn category(&self, code: u32) -> Option<&str> {
        self.categories.get(code as usize).map(String::as_str)
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Check a deserialized encoding: unique categories and a matching digest.
    pub fn verify(&self) -> Result<()> {
        let rebuilt = Self::from_categories(self.categories.clone())?;
        if rebuilt.version != self.version {
            return Err(FraudError::SchemaMismatch {
                expected: rebuilt.version,
                found: self.version.clone(),
            });
        }
        Ok(())
    }
}

fn fingerprint(categories: &[String]) -> String {
    let mut hasher = Sha256::new();
    for category in categories {
        hasher.update(category.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(&hasher.finalize()[..8])
}

/// Accumulates categories in first-seen order.
///
/// Used to build an encoding over a dataset streamed in chunks.
#[derive(Debug, Default)]
pub struct EncodingBuilder {
    seen: Vec<String>,
    observed: usize,
}

impl EncodingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing encoding: its codes are kept and newly seen
    /// categories are appended after them.
    pub fn extending(encoding: &CategoryEncoding) -> Self {
        Self {
            seen: encoding.categories.clone(),
            observed: 0,
        }
    }

    pub fn observe(&mut self, category: &str) {
        self.observed += 1;
        if !self.seen.iter().any(|c| c == category) {
            self.seen.push(category.to_string());
        }
    }

    /// Number of values observed so far
    pub fn observed(&self) -> usize {
        self.observed
    }

    pub fn build(self) -> Result<CategoryEncoding> {
        if self.observed == 0 {
            return Err(FraudError::EmptyDataset);
        }
        CategoryEncoding::from_categories(self.seen)
    }
}

/// Numeric model input tagged with the encoding that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: Vec<f64>,
    pub encoding_version: String,
}

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Translates transaction records into feature vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureCodec {
    schema: FeatureSchema,
}

impl FeatureCodec {
    pub fn new(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> FeatureSchema {
        self.schema
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.schema.feature_names()
    }

    pub fn feature_count(&self) -> usize {
        self.schema.feature_count()
    }

    /// Build an encoding from the categories of `records`, in first-seen order.
    pub fn build_encoding(&self, records: &[TransactionRecord]) -> Result<CategoryEncoding> {
        let mut builder = EncodingBuilder::new();
        for record in records {
            builder.observe(&record.tx_type);
        }
        builder.build()
    }

    /// Encode a record. Fails on unknown categories and invalid numbers.
    pub fn encode(
        &self,
        record: &TransactionRecord,
        encoding: &CategoryEncoding,
    ) -> Result<FeatureVector> {
        record.validate()?;
        let code = encoding.code(&record.tx_type)?;
        let amounts = record.amounts();

        let mut values = Vec::with_capacity(self.feature_count());
        if self.schema.include_step {
            values.push(record.step.unwrap_or(0) as f64);
        }
        values.push(code as f64);
        values.push(amounts.amount);
        values.push(amounts.origin_before);
        values.push(amounts.origin_after);
        values.push(amounts.dest_before);
        values.push(amounts.dest_after);

        Ok(FeatureVector {
            values,
            encoding_version: encoding.version.clone(),
        })
    }
}
