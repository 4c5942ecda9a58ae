//! Transaction record as read from a dataset row or a scoring request

use crate::error::{FraudError, Result};
use serde::{Deserialize, Deserializer, Serialize};

/// A single financial transaction to be trained on or scored.
///
/// Field aliases accept both the dataset column names (`oldbalanceOrg`,
/// `nameDest`, `isFraud`, ...) and the snake_case request payload names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Ordinal time index (1-based)
    #[serde(default)]
    pub step: Option<u32>,

    /// Transaction category (PAYMENT, TRANSFER, CASH_OUT, ...)
    #[serde(rename = "type", alias = "tx_type", alias = "transaction_type")]
    pub tx_type: String,

    /// Transaction amount
    #[serde(default)]
    pub amount: Option<f64>,

    /// Origin account balance before the transaction
    #[serde(default, alias = "oldbalanceOrg", alias = "oldbalanceOrig")]
    pub old_balance_origin: Option<f64>,

    /// Origin account balance after the transaction
    #[serde(default, alias = "newbalanceOrg", alias = "newbalanceOrig")]
    pub new_balance_origin: Option<f64>,

    /// Destination account balance before the transaction
    #[serde(default, alias = "oldbalanceDest")]
    pub old_balance_dest: Option<f64>,

    /// Destination account balance after the transaction
    #[serde(default, alias = "newbalanceDest")]
    pub new_balance_dest: Option<f64>,

    /// Sender identity, never a model input
    #[serde(default, alias = "nameOrig")]
    pub sender: Option<String>,

    /// Recipient identity, never a model input
    #[serde(default, alias = "nameDest")]
    pub recipient: Option<String>,

    /// Fraud label, present only in training data
    #[serde(default, alias = "isFraud", deserialize_with = "deserialize_label")]
    pub is_fraud: Option<bool>,
}

/// Numeric fields with missing values substituted by zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Amounts {
    pub amount: f64,
    pub origin_before: f64,
    pub origin_after: f64,
    pub dest_before: f64,
    pub dest_after: f64,
}

impl TransactionRecord {
    /// Create a record of the given category with every numeric field absent
    pub fn new(tx_type: impl Into<String>) -> Self {
        Self {
            step: None,
            tx_type: tx_type.into(),
            amount: None,
            old_balance_origin: None,
            new_balance_origin: None,
            old_balance_dest: None,
            new_balance_dest: None,
            sender: None,
            recipient: None,
            is_fraud: None,
        }
    }

    pub fn with_step(mut self, step: u32) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Set origin balances before and after the transaction
    pub fn with_origin_balances(mut self, before: f64, after: f64) -> Self {
        self.old_balance_origin = Some(before);
        self.new_balance_origin = Some(after);
        self
    }

    /// Set destination balances before and after the transaction
    pub fn with_dest_balances(mut self, before: f64, after: f64) -> Self {
        self.old_balance_dest = Some(before);
        self.new_balance_dest = Some(after);
        self
    }

    pub fn with_participants(
        mut self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Self {
        self.sender = Some(sender.into());
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_label(mut self, is_fraud: bool) -> Self {
        self.is_fraud = Some(is_fraud);
        self
    }

    /// Drop sender/recipient identity so it cannot leak into training
    pub fn without_identifiers(mut self) -> Self {
        self.sender = None;
        self.recipient = None;
        self
    }

    /// Numeric fields with absent values read as zero.
    pub fn amounts(&self) -> Amounts {
        Amounts {
            amount: self.amount.unwrap_or(0.0),
            origin_before: self.old_balance_origin.unwrap_or(0.0),
            origin_after: self.new_balance_origin.unwrap_or(0.0),
            dest_before: self.old_balance_dest.unwrap_or(0.0),
            dest_after: self.new_balance_dest.unwrap_or(0.0),
        }
    }

    /// Reject empty categories and negative or non-finite numeric values.
    pub fn validate(&self) -> Result<()> {
        if self.tx_type.trim().is_empty() {
            return Err(FraudError::invalid_format("transaction type is empty"));
        }

        let numeric = [
            ("amount", self.amount),
            ("oldbalanceOrg", self.old_balance_origin),
            ("newbalanceOrg", self.new_balance_origin),
            ("oldbalanceDest", self.old_balance_dest),
            ("newbalanceDest", self.new_balance_dest),
        ];
        for (name, value) in numeric {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(FraudError::invalid_format(format!(
                        "{} must be a non-negative number, got {}",
                        name, v
                    )));
                }
            }
        }

        if self.step == Some(0) {
            return Err(FraudError::invalid_format("step must be >= 1"));
        }

        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Accepts `0`/`1`, `true`/`false` and empty cells.
fn deserialize_label<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<LabelValue> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(LabelValue::Bool(b)) => Ok(Some(b)),
        Some(LabelValue::Int(0)) => Ok(Some(false)),
        Some(LabelValue::Int(1)) => Ok(Some(true)),
        Some(LabelValue::Float(f)) if f == 0.0 => Ok(Some(false)),
        Some(LabelValue::Float(f)) if f == 1.0 => Ok(Some(true)),
        Some(LabelValue::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "0" | "false" => Ok(Some(false)),
            "1" | "true" => Ok(Some(true)),
            other => Err(serde::de::Error::custom(format!(
                "invalid fraud label '{}'",
                other
            ))),
        },
        Some(_) => Err(serde::de::Error::custom("fraud label must be 0 or 1")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_payload_deserialization() {
        let json = r#"{
            "type": "CASH_OUT",
            "amount": 50000.0,
            "oldbalanceOrg": 50000.0,
            "newbalanceOrg": 0.0,
            "oldbalanceDest": 0.0,
            "newbalanceDest": 0.0,
            "sender": "Anonymous User",
            "recipient": "Unknown Account"
        }"#;

        let tx: TransactionRecord = serde_json::from_str(json).unwrap();

        assert_eq!(tx.tx_type, "CASH_OUT");
        assert_eq!(tx.amount, Some(50000.0));
        assert_eq!(tx.new_balance_origin, Some(0.0));
        assert_eq!(tx.step, None);
        assert_eq!(tx.is_fraud, None);
        assert_eq!(tx.sender.as_deref(), Some("Anonymous User"));
    }

    #[test]
    fn test_csv_row_deserialization() {
        let data = "step,type,amount,nameOrig,oldbalanceOrg,newbalanceOrg,nameDest,oldbalanceDest,newbalanceDest,isFraud,isFlaggedFraud\n\
                    1,TRANSFER,181.0,C1305486145,181.0,0.0,C553264065,,0.0,1,0\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let tx: TransactionRecord = reader.deserialize().next().unwrap().unwrap();

        assert_eq!(tx.step, Some(1));
        assert_eq!(tx.tx_type, "TRANSFER");
        assert_eq!(tx.old_balance_dest, None);
        assert_eq!(tx.is_fraud, Some(true));
        assert_eq!(tx.recipient.as_deref(), Some("C553264065"));
    }

    #[test]
    fn test_missing_values_read_as_zero() {
        let tx = TransactionRecord::new("PAYMENT").with_amount(12.5);
        let amounts = tx.amounts();

        assert_eq!(amounts.amount, 12.5);
        assert_eq!(amounts.origin_before, 0.0);
        assert_eq!(amounts.dest_after, 0.0);
    }

    #[test]
    fn test_validate_rejects_negative_amount() {
        let tx = TransactionRecord::new("PAYMENT").with_amount(-1.0);
        assert!(matches!(tx.validate(), Err(FraudError::InvalidFormat(_))));

        let tx = TransactionRecord::new("PAYMENT").with_amount(f64::NAN);
        assert!(tx.validate().is_err());

        let tx = TransactionRecord::new(" ").with_amount(1.0);
        assert!(tx.validate().is_err());
    }

    #[test]
    fn test_without_identifiers() {
        let tx = TransactionRecord::new("PAYMENT")
            .with_participants("John Doe", "Jane Smith")
            .without_identifiers();

        assert!(tx.sender.is_none());
        assert!(tx.recipient.is_none());
    }
}
