//! Train on a CSV dataset, persist, reload and score.

use fraud_risk_scoring::config::AppConfig;
use fraud_risk_scoring::models::{ArtifactStore, ScoringEngine};
use fraud_risk_scoring::training::TrainingPipeline;
use fraud_risk_scoring::types::{Recommendation, RiskLevel, RiskLevelThresholds};
use fraud_risk_scoring::{FraudError, TransactionRecord};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const HEADER: &str = "step,type,amount,nameOrig,oldbalanceOrg,newbalanceOrg,nameDest,oldbalanceDest,newbalanceDest,isFraud,isFlaggedFraud";

/// Legitimate traffic across all categories plus drained-account fraud.
fn write_dataset(dir: &Path, n_legit: usize, n_fraud: usize) -> PathBuf {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let types = ["PAYMENT", "CASH_IN", "CASH_OUT", "TRANSFER", "DEBIT"];
    let mut body = String::from(HEADER);
    body.push('\n');

    for i in 0..n_legit {
        let tx_type = types[i % types.len()];
        let amount: f64 = rng.gen_range(10.0..60_000.0_f64).round();
        let origin_before = amount + rng.gen_range(100.0..20_000.0_f64).round();
        let dest_before = rng.gen_range(100.0..50_000.0_f64).round();
        writeln!(
            body,
            "{},{},{},C{},{},{},M{},{},{},0,0",
            i / 50 + 1,
            tx_type,
            amount,
            i,
            origin_before,
            origin_before - amount,
            i,
            dest_before,
            dest_before + amount
        )
        .unwrap();
    }
    for i in 0..n_fraud {
        let tx_type = if i % 2 == 0 { "CASH_OUT" } else { "TRANSFER" };
        let amount: f64 = rng.gen_range(10_000.0..300_000.0_f64).round();
        writeln!(
            body,
            "{},{},{},C9{},{},0,C8{},0,0,1,0",
            i + 1,
            tx_type,
            amount,
            i,
            amount,
            i
        )
        .unwrap();
    }

    let path = dir.join("transactions.csv");
    std::fs::write(&path, body).unwrap();
    path
}

fn config(models_dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.paths.models_dir = models_dir.to_path_buf();
    config.training.min_samples = 100;
    config.training.chunk_size = 128;
    config
}

fn zero_balance_cash_out() -> TransactionRecord {
    TransactionRecord::new("CASH_OUT")
        .with_amount(50_000.0)
        .with_origin_balances(50_000.0, 0.0)
        .with_dest_balances(0.0, 0.0)
}

fn regular_payment() -> TransactionRecord {
    TransactionRecord::new("PAYMENT")
        .with_amount(5_000.0)
        .with_origin_balances(10_000.0, 5_000.0)
        .with_dest_balances(2_000.0, 7_000.0)
}

#[test]
fn test_zero_balance_cash_out_scores_high() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path(), 600, 60);
    let config = config(&dir.path().join("models"));

    let outcome = TrainingPipeline::from_config(&config)
        .train_from_csv(&data)
        .unwrap();
    let engine = ScoringEngine::from_config(&config).unwrap();
    let assessment = engine.score(&zero_balance_cash_out()).unwrap();

    assert_eq!(assessment.model_version, outcome.version());
    assert!(assessment.fraud_probability > 0.7);
    assert_eq!(assessment.risk_level, RiskLevel::High);
    assert_eq!(assessment.recommendation, Recommendation::Block);
    assert_eq!(
        assessment.factor_descriptions(),
        vec![
            "High transaction amount",
            "Perfect balance consistency",
            "Recipient account shows no activity",
            "CASH_OUT transactions have higher risk",
        ]
    );
}

#[test]
fn test_regular_payment_scores_low() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path(), 600, 60);
    let config = config(&dir.path().join("models"));

    TrainingPipeline::from_config(&config)
        .train_from_csv(&data)
        .unwrap();
    let engine = ScoringEngine::from_config(&config).unwrap();
    let assessment = engine
        .score(&regular_payment().with_participants("C1", "M2"))
        .unwrap();

    assert_eq!(assessment.risk_level, RiskLevel::Low);
    assert_eq!(assessment.recommendation, Recommendation::Approve);
    assert_eq!(
        assessment.factor_descriptions(),
        vec!["Perfect balance consistency"]
    );
    assert!(assessment.validation.balance_consistent);
    assert!(assessment.validation.amount_reasonable);
    assert!(assessment.validation.different_participants);
}

#[test]
fn test_metadata_records_training_provenance() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path(), 600, 60);
    let config = config(&dir.path().join("models"));

    let outcome = TrainingPipeline::from_config(&config)
        .train_from_csv(&data)
        .unwrap();
    let metadata = &outcome.artifact.metadata;

    assert_eq!(
        metadata.feature_order,
        vec![
            "step",
            "type",
            "amount",
            "oldbalanceOrg",
            "newbalanceOrg",
            "oldbalanceDest",
            "newbalanceDest",
        ]
    );
    // 420 legitimate and 42 fraud rows remain after the 30% hold-out
    assert_eq!(metadata.training_samples, 462);
    assert_eq!(metadata.positive_samples, 42);
    assert_eq!(metadata.positive_weight, 10.0);
    assert_eq!(metadata.evaluation.samples, 198);
    assert!(metadata.evaluation.auc_roc.unwrap() > 0.99);
    assert_eq!(
        outcome.artifact.encoding.categories(),
        ["PAYMENT", "CASH_IN", "CASH_OUT", "TRANSFER", "DEBIT"]
    );
    assert!(metadata.warnings.is_empty());
}

#[test]
fn test_scoring_is_deterministic_across_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path(), 300, 30);
    let config = config(&dir.path().join("models"));

    TrainingPipeline::from_config(&config)
        .train_from_csv(&data)
        .unwrap();
    let first = ScoringEngine::from_config(&config).unwrap();
    let second = ScoringEngine::from_config(&config).unwrap();

    for record in [zero_balance_cash_out(), regular_payment()] {
        let a = first.score(&record).unwrap();
        let b = first.score(&record).unwrap();
        let c = second.score(&record).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.fraud_probability, c.fraud_probability);
    }
}

#[test]
fn test_chunk_size_does_not_change_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path(), 300, 30);

    let mut small = config(&dir.path().join("small"));
    small.training.chunk_size = 7;
    let mut large = config(&dir.path().join("large"));
    large.training.chunk_size = 100_000;

    let a = TrainingPipeline::from_config(&small).train_from_csv(&data).unwrap();
    let b = TrainingPipeline::from_config(&large).train_from_csv(&data).unwrap();

    assert_eq!(a.artifact.model, b.artifact.model);
    assert_eq!(a.artifact.encoding, b.artifact.encoding);
}

#[test]
fn test_retraining_moves_latest_and_engine_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path(), 300, 30);
    let config = config(&dir.path().join("models"));
    let pipeline = TrainingPipeline::from_config(&config);

    let first = pipeline.train_from_csv(&data).unwrap();
    let engine = ScoringEngine::from_config(&config).unwrap();
    let held = engine.artifact();

    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = pipeline.train_from_csv(&data).unwrap();
    assert_ne!(first.version(), second.version());

    let store = ArtifactStore::new(&config.paths.models_dir);
    assert_eq!(
        store.list_versions().unwrap(),
        vec![second.version().to_string(), first.version().to_string()]
    );

    // the engine keeps its snapshot until told to reload
    assert_eq!(engine.score(&regular_payment()).unwrap().model_version, first.version());
    assert_eq!(engine.reload_latest(&store).unwrap(), second.version());
    assert_eq!(engine.score(&regular_payment()).unwrap().model_version, second.version());
    assert_eq!(held.version(), first.version());
}

#[test]
fn test_unknown_category_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path(), 300, 30);
    let config = config(&dir.path().join("models"));

    TrainingPipeline::from_config(&config)
        .train_from_csv(&data)
        .unwrap();
    let engine = ScoringEngine::from_config(&config).unwrap();
    let record = TransactionRecord::new("WIRE_TRANSFER").with_amount(100.0);

    match engine.score(&record) {
        Err(FraudError::UnknownCategory(category)) => assert_eq!(category, "WIRE_TRANSFER"),
        other => panic!("expected UnknownCategory, got {:?}", other),
    }
}

#[test]
fn test_scoring_without_model_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("models"));

    assert!(matches!(
        ScoringEngine::from_config(&config),
        Err(FraudError::ModelUnavailable(_))
    ));
}

#[test]
fn test_malformed_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("models"));
    let pipeline = TrainingPipeline::from_config(&config);

    let no_label = dir.path().join("no_label.csv");
    std::fs::write(
        &no_label,
        "step,type,amount,oldbalanceOrg,newbalanceOrg,oldbalanceDest,newbalanceDest\n1,PAYMENT,10,20,10,0,0\n",
    )
    .unwrap();
    assert!(matches!(
        pipeline.train_from_csv(&no_label),
        Err(FraudError::InvalidFormat(_))
    ));

    let not_csv = dir.path().join("data.json");
    std::fs::write(&not_csv, "{}").unwrap();
    assert!(matches!(
        pipeline.train_from_csv(&not_csv),
        Err(FraudError::InvalidFormat(_))
    ));

    let header_only = dir.path().join("empty.csv");
    std::fs::write(&header_only, format!("{}\n", HEADER)).unwrap();
    assert!(matches!(
        pipeline.train_from_csv(&header_only),
        Err(FraudError::EmptyDataset)
    ));

    assert!(matches!(
        pipeline.train_from_csv(dir.path().join("missing.csv")),
        Err(FraudError::InputNotFound(_))
    ));
}

#[test]
fn test_tier_boundaries_are_strict() {
    let thresholds = RiskLevelThresholds::default();

    assert_eq!(RiskLevel::from_probability(0.7, &thresholds), RiskLevel::Medium);
    assert_eq!(RiskLevel::from_probability(0.7000001, &thresholds), RiskLevel::High);
    assert_eq!(RiskLevel::from_probability(0.3, &thresholds), RiskLevel::Low);
    assert_eq!(RiskLevel::from_probability(0.3000001, &thresholds), RiskLevel::Medium);
}
