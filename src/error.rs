//! Error taxonomy for the scoring pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by feature encoding, training, artifact handling and scoring.
#[derive(Error, Debug)]
pub enum FraudError {
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Dataset contains no records")]
    EmptyDataset,

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Unknown transaction category '{0}'")]
    UnknownCategory(String),

    #[error("Schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FraudError {
    pub(crate) fn invalid_format(message: impl Into<String>) -> Self {
        FraudError::InvalidFormat(message.into())
    }
}

pub type Result<T> = std::result::Result<T, FraudError>;
