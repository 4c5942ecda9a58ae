//! Evaluation metrics for the binary fraud classifier.

use serde::{Deserialize, Serialize};
use tracing::info;

/// Area under the ROC curve via the rank-sum statistic.
///
/// Tied scores receive their average rank. Returns `None` when either class
/// is absent, since the curve is undefined.
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> Option<f64> {
    if labels.len() != scores.len() {
        return None;
    }

    let n_pos = labels.iter().filter(|&&l| l).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based; tied block i..=j shares the mean rank
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if labels[idx] {
                positive_rank_sum += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Weighted binary cross-entropy. Probabilities are clipped away from 0 and 1.
pub fn log_loss(labels: &[bool], probabilities: &[f64], weights: Option<&[f64]>) -> f64 {
    const EPS: f64 = 1e-15;

    let mut total = 0.0;
    let mut weight_sum = 0.0;
    for (i, (&label, &p)) in labels.iter().zip(probabilities).enumerate() {
        let w = weights.and_then(|w| w.get(i).copied()).unwrap_or(1.0);
        let p = p.clamp(EPS, 1.0 - EPS);
        let loss = if label { -p.ln() } else { -(1.0 - p).ln() };
        total += w * loss;
        weight_sum += w;
    }

    if weight_sum > 0.0 {
        total / weight_sum
    } else {
        0.0
    }
}

/// Binary confusion matrix with fraud as the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negatives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub true_positives: u64,
}

impl ConfusionMatrix {
    pub fn from_predictions(labels: &[bool], predictions: &[bool]) -> Self {
        let mut matrix = Self::default();
        for (&label, &predicted) in labels.iter().zip(predictions) {
            match (label, predicted) {
                (false, false) => matrix.true_negatives += 1,
                (false, true) => matrix.false_positives += 1,
                (true, false) => matrix.false_negatives += 1,
                (true, true) => matrix.true_positives += 1,
            }
        }
        matrix
    }

    pub fn total(&self) -> u64 {
        self.true_negatives + self.false_positives + self.false_negatives + self.true_positives
    }
}

/// Precision, recall and F1 for one class
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u64,
}

impl ClassMetrics {
    fn from_counts(true_pos: u64, false_pos: u64, false_neg: u64) -> Self {
        let ratio = |num: u64, den: u64| if den > 0 { num as f64 / den as f64 } else { 0.0 };
        let precision = ratio(true_pos, true_pos + false_pos);
        let recall = ratio(true_pos, true_pos + false_neg);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1,
            support: true_pos + false_neg,
        }
    }
}

/// Per-class report
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub legitimate: ClassMetrics,
    pub fraud: ClassMetrics,
    pub accuracy: f64,
}

impl ClassificationReport {
    pub fn from_confusion(matrix: &ConfusionMatrix) -> Self {
        let legitimate = ClassMetrics::from_counts(
            matrix.true_negatives,
            matrix.false_negatives,
            matrix.false_positives,
        );
        let fraud = ClassMetrics::from_counts(
            matrix.true_positives,
            matrix.false_positives,
            matrix.false_negatives,
        );
        let total = matrix.total();
        let accuracy = if total > 0 {
            (matrix.true_positives + matrix.true_negatives) as f64 / total as f64
        } else {
            0.0
        };
        Self {
            legitimate,
            fraud,
            accuracy,
        }
    }
}

/// Held-out evaluation of a trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    /// `None` when the evaluation set lacks one of the classes
    pub auc_roc: Option<f64>,
    pub log_loss: f64,
    /// Probability cut-off used for the confusion matrix
    pub decision_threshold: f64,
    pub confusion_matrix: ConfusionMatrix,
    pub report: ClassificationReport,
    pub samples: usize,
}

impl EvaluationMetrics {
    pub fn evaluate(labels: &[bool], probabilities: &[f64], decision_threshold: f64) -> Self {
        let predictions: Vec<bool> = probabilities
            .iter()
            .map(|&p| p >= decision_threshold)
            .collect();
        let confusion_matrix = ConfusionMatrix::from_predictions(labels, &predictions);

        Self {
            auc_roc: roc_auc(labels, probabilities),
            log_loss: log_loss(labels, probabilities, None),
            decision_threshold,
            report: ClassificationReport::from_confusion(&confusion_matrix),
            confusion_matrix,
            samples: labels.len(),
        }
    }

    /// Log a summary table
    pub fn log_summary(&self) {
        let auc = self
            .auc_roc
            .map(|a| format!("{:.4}", a))
            .unwrap_or_else(|| "n/a".to_string());
        let cm = &self.confusion_matrix;

        info!("╔══════════════════════════════════════════════════════╗");
        info!("║              MODEL EVALUATION (held-out)             ║");
        info!("╠══════════════════════════════════════════════════════╣");
        info!(
            "║ Samples: {:>8}   AUC-ROC: {:>7}   LogLoss: {:>7.4} ║",
            self.samples, auc, self.log_loss
        );
        info!("╠══════════════════════════════════════════════════════╣");
        info!("║ class        precision   recall   f1-score   support ║");
        for (name, m) in [("legitimate", &self.report.legitimate), ("fraud", &self.report.fraud)] {
            info!(
                "║ {:<12} {:>9.4} {:>8.4} {:>10.4} {:>9} ║",
                name, m.precision, m.recall, m.f1, m.support
            );
        }
        info!("║ accuracy     {:>40.4} ║", self.report.accuracy);
        info!("╠══════════════════════════════════════════════════════╣");
        info!(
            "║ Confusion: TN={:<8} FP={:<8} FN={:<8} TP={:<6}║",
            cm.true_negatives, cm.false_positives, cm.false_negatives, cm.true_positives
        );
        info!("╚══════════════════════════════════════════════════════╝");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auc_perfect_and_inverted() {
        let labels = [false, false, true, true];
        assert_eq!(roc_auc(&labels, &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&labels, &[0.9, 0.8, 0.2, 0.1]), Some(0.0));
    }

    #[test]
    fn test_auc_with_ties() {
        let labels = [false, true, false, true];
        // every score tied: AUC is 0.5
        assert_eq!(roc_auc(&labels, &[0.5, 0.5, 0.5, 0.5]), Some(0.5));

        // one positive ties with one negative at the top
        let auc = roc_auc(&[false, false, true], &[0.1, 0.7, 0.7]).unwrap();
        assert!((auc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_auc_undefined_for_single_class() {
        assert_eq!(roc_auc(&[true, true], &[0.2, 0.9]), None);
        assert_eq!(roc_auc(&[], &[]), None);
    }

    #[test]
    fn test_log_loss() {
        let loss = log_loss(&[true, false], &[0.5, 0.5], None);
        assert!((loss - std::f64::consts::LN_2).abs() < 1e-12);

        let weighted = log_loss(&[true, false], &[0.9, 0.5], Some(&[0.0, 1.0]));
        assert!((weighted - std::f64::consts::LN_2).abs() < 1e-12);
    }

    #[test]
    fn test_confusion_and_report() {
        let labels = [true, true, true, false, false, false, false, false];
        let probs = [0.9, 0.8, 0.2, 0.6, 0.1, 0.1, 0.3, 0.2];

        let metrics = EvaluationMetrics::evaluate(&labels, &probs, 0.5);
        let cm = metrics.confusion_matrix;

        assert_eq!(cm.true_positives, 2);
        assert_eq!(cm.false_negatives, 1);
        assert_eq!(cm.false_positives, 1);
        assert_eq!(cm.true_negatives, 4);
        assert_eq!(metrics.report.fraud.support, 3);
        assert_eq!(metrics.report.legitimate.support, 5);
        assert!((metrics.report.fraud.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((metrics.report.fraud.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((metrics.report.legitimate.recall - 0.8).abs() < 1e-12);
        assert!((metrics.report.accuracy - 0.75).abs() < 1e-12);
        assert_eq!(metrics.samples, 8);
    }
}
