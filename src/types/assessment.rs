//! Risk assessment data structures

use serde::{Deserialize, Serialize};
use std::fmt;

/// Risk tier derived from the fraud probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Map a probability to a tier. Both bounds are strict: a probability
    /// equal to a threshold falls into the lower tier.
    pub fn from_probability(probability: f64, thresholds: &RiskLevelThresholds) -> Self {
        if probability > thresholds.high {
            RiskLevel::High
        } else if probability > thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Action recommended for this tier
    pub fn recommendation(&self) -> Recommendation {
        match self {
            RiskLevel::High => Recommendation::Block,
            RiskLevel::Medium => Recommendation::AdditionalVerification,
            RiskLevel::Low => Recommendation::Approve,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// Configurable tier thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLevelThresholds {
    /// Probabilities above this are at least MEDIUM
    pub medium: f64,
    /// Probabilities above this are HIGH
    pub high: f64,
}

impl Default for RiskLevelThresholds {
    fn default() -> Self {
        Self {
            medium: 0.3,
            high: 0.7,
        }
    }
}

/// Action attached to a risk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Block,
    AdditionalVerification,
    Approve,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Recommendation::Block => "BLOCK TRANSACTION",
            Recommendation::AdditionalVerification => "ADDITIONAL VERIFICATION",
            Recommendation::Approve => "APPROVE TRANSACTION",
        };
        f.write_str(s)
    }
}

/// Business rule that produced a risk factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactorKind {
    HighAmount,
    PerfectBalanceConsistency,
    InactiveRecipient,
    HighRiskType,
}

/// Advisory explanation attached to an assessment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub kind: RiskFactorKind,
    pub description: String,
}

impl RiskFactor {
    pub fn new(kind: RiskFactorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }
}

/// Structural checks on the record; informational only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Origin balance drop equals the amount
    pub balance_consistent: bool,
    /// Amount lies strictly between zero and the plausibility ceiling
    pub amount_reasonable: bool,
    /// Sender and recipient differ
    pub different_participants: bool,
}

/// Result of scoring one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Model fraud-class probability (0.0 - 1.0)
    pub fraud_probability: f64,

    /// Tier derived from the probability
    pub risk_level: RiskLevel,

    /// Action for the tier
    pub recommendation: Recommendation,

    /// Rule-based explanations, in rule order
    pub risk_factors: Vec<RiskFactor>,

    /// Structural validation flags
    pub validation: ValidationReport,

    /// Version of the artifact that produced the probability
    pub model_version: String,
}

impl RiskAssessment {
    /// Descriptions of the triggered risk factors
    pub fn factor_descriptions(&self) -> Vec<&str> {
        self.risk_factors
            .iter()
            .map(|f| f.description.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_from_probability() {
        let thresholds = RiskLevelThresholds::default();

        assert_eq!(RiskLevel::from_probability(0.1, &thresholds), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.5, &thresholds), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.75, &thresholds), RiskLevel::High);
        assert_eq!(RiskLevel::from_probability(1.0, &thresholds), RiskLevel::High);
        assert_eq!(RiskLevel::from_probability(0.0, &thresholds), RiskLevel::Low);
    }

    #[test]
    fn test_threshold_boundaries_are_strict() {
        let thresholds = RiskLevelThresholds::default();

        assert_eq!(RiskLevel::from_probability(0.7, &thresholds), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.3, &thresholds), RiskLevel::Low);
        assert_eq!(
            RiskLevel::from_probability(0.700_000_1, &thresholds),
            RiskLevel::High
        );
    }

    #[test]
    fn test_recommendations() {
        assert_eq!(RiskLevel::High.recommendation(), Recommendation::Block);
        assert_eq!(
            RiskLevel::Medium.recommendation(),
            Recommendation::AdditionalVerification
        );
        assert_eq!(RiskLevel::Low.recommendation().to_string(), "APPROVE TRANSACTION");
    }

    #[test]
    fn test_assessment_serialization() {
        let assessment = RiskAssessment {
            fraud_probability: 0.82,
            risk_level: RiskLevel::High,
            recommendation: Recommendation::Block,
            risk_factors: vec![RiskFactor::new(
                RiskFactorKind::HighAmount,
                "High transaction amount",
            )],
            validation: ValidationReport {
                balance_consistent: true,
                amount_reasonable: true,
                different_participants: true,
            },
            model_version: "20261016T101500123Z".to_string(),
        };

        let json = serde_json::to_value(&assessment).unwrap();
        assert_eq!(json["risk_level"], "HIGH");
        assert_eq!(json["recommendation"], "BLOCK");
        assert_eq!(json["risk_factors"][0]["kind"], "high_amount");
    }
}
