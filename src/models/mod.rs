//! Gradient-boosted model, persisted artifacts and scoring

pub mod artifact;
pub mod gbm;
pub mod inference;

pub use artifact::{ArtifactStore, ModelArtifact};
pub use gbm::{BoosterParams, GradientBoostedTrees};
pub use inference::ScoringEngine;
