//! Rule-based risk factors and structural validation.
//!
//! These annotate an assessment for a human reviewer. They are computed
//! from the raw record only and never feed the model, so retraining cannot
//! change what a rule reports.

use crate::types::assessment::{RiskFactor, RiskFactorKind, ValidationReport};
use crate::types::transaction::TransactionRecord;
use serde::{Deserialize, Serialize};

/// Rule parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// Amounts above this are flagged as large
    pub large_amount: f64,
    /// Amounts at or above this fail the plausibility check
    pub max_plausible_amount: f64,
    /// Categories flagged as higher risk
    pub high_risk_types: Vec<String>,
    /// Absolute tolerance for balance arithmetic
    pub balance_tolerance: f64,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            large_amount: 10_000.0,
            max_plausible_amount: 100_000.0,
            high_risk_types: vec!["CASH_OUT".to_string(), "TRANSFER".to_string()],
            balance_tolerance: 1e-6,
        }
    }
}

/// Evaluates the advisory rules against a record
#[derive(Debug, Clone, Default)]
pub struct RiskRules {
    config: RuleConfig,
}

impl RiskRules {
    pub fn new(config: RuleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    fn origin_drawdown_matches(&self, record: &TransactionRecord) -> bool {
        let a = record.amounts();
        (a.origin_before - a.origin_after - a.amount).abs() <= self.config.balance_tolerance
    }

    /// Triggered risk factors, in fixed rule order.
    pub fn risk_factors(&self, record: &TransactionRecord) -> Vec<RiskFactor> {
        let a = record.amounts();
        let mut factors = Vec::new();

        if a.amount > self.config.large_amount {
            factors.push(RiskFactor::new(
                RiskFactorKind::HighAmount,
                "High transaction amount",
            ));
        }

        // origin drained by exactly the amount
        if self.origin_drawdown_matches(record) {
            factors.push(RiskFactor::new(
                RiskFactorKind::PerfectBalanceConsistency,
                "Perfect balance consistency",
            ));
        }

        if a.dest_before == 0.0 && a.dest_after == 0.0 {
            factors.push(RiskFactor::new(
                RiskFactorKind::InactiveRecipient,
                "Recipient account shows no activity",
            ));
        }

        if self.config.high_risk_types.iter().any(|t| *t == record.tx_type) {
            factors.push(RiskFactor::new(
                RiskFactorKind::HighRiskType,
                format!("{} transactions have higher risk", record.tx_type),
            ));
        }

        factors
    }

    /// Structural checks. Informational; never blocks scoring.
    pub fn validate(&self, record: &TransactionRecord) -> ValidationReport {
        let amount = record.amounts().amount;
        let sender = record.sender.as_deref().unwrap_or("");
        let recipient = record.recipient.as_deref().unwrap_or("");

        ValidationReport {
            balance_consistent: self.origin_drawdown_matches(record),
            amount_reasonable: amount > 0.0 && amount < self.config.max_plausible_amount,
            different_participants: sender != recipient,
        }
    }
}
