//! Type definitions for the fraud-risk scoring pipeline

pub mod assessment;
pub mod transaction;

pub use assessment::{
    Recommendation, RiskAssessment, RiskFactor, RiskFactorKind, RiskLevel, RiskLevelThresholds,
    ValidationReport,
};
pub use transaction::{Amounts, TransactionRecord};
