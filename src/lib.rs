//! Fraud-Risk Scoring Library
//!
//! Encodes transaction records into feature vectors, trains an
//! imbalance-weighted gradient-boosted classifier on labeled history, and
//! scores new transactions into a probability, a risk tier and rule-based
//! explanations.

pub mod config;
pub mod dataset;
pub mod error;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod rules;
pub mod training;
pub mod types;

pub use config::AppConfig;
pub use error::{FraudError, Result};
pub use feature_extractor::{CategoryEncoding, FeatureCodec, FeatureSchema, FeatureVector};
pub use models::{ArtifactStore, ModelArtifact, ScoringEngine};
pub use rules::RiskRules;
pub use training::{TrainingOutcome, TrainingPipeline};
pub use types::{RiskAssessment, RiskLevel, TransactionRecord};
