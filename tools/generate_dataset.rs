//! Synthetic Dataset Generator
//!
//! Writes PaySim-shaped labeled transactions as CSV for demos and smoke
//! tests of the training pipeline.

use anyhow::{Context, Result};
use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "generate-dataset")]
#[command(about = "Generate a synthetic labeled transaction dataset", long_about = None)]
struct Args {
    /// Output CSV path ("-" for stdout)
    #[arg(short, long, default_value = "-")]
    output: String,

    /// Number of rows
    #[arg(short = 'n', long, default_value = "10000")]
    count: u64,

    /// Share of fraudulent rows
    #[arg(long, default_value = "0.01")]
    fraud_rate: f64,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,
}

/// One CSV row with the dataset's column names
#[derive(Debug, Serialize)]
struct Row {
    step: u32,
    #[serde(rename = "type")]
    tx_type: &'static str,
    amount: f64,
    #[serde(rename = "nameOrig")]
    name_orig: String,
    #[serde(rename = "oldbalanceOrg")]
    old_balance_org: f64,
    #[serde(rename = "newbalanceOrg")]
    new_balance_org: f64,
    #[serde(rename = "nameDest")]
    name_dest: String,
    #[serde(rename = "oldbalanceDest")]
    old_balance_dest: f64,
    #[serde(rename = "newbalanceDest")]
    new_balance_dest: f64,
    #[serde(rename = "isFraud")]
    is_fraud: u8,
    #[serde(rename = "isFlaggedFraud")]
    is_flagged_fraud: u8,
}

/// Transaction generator
struct TransactionGenerator {
    rng: ChaCha8Rng,
    counter: u64,
}

impl TransactionGenerator {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            counter: 0,
        }
    }

    fn round_cents(v: f64) -> f64 {
        (v * 100.0).round() / 100.0
    }

    fn next_step(&mut self) -> u32 {
        self.counter += 1;
        // roughly one simulated hour per 1000 rows
        (self.counter / 1000) as u32 + 1
    }

    /// Generate a legitimate transaction
    fn generate_legitimate(&mut self) -> Row {
        let step = self.next_step();
        let tx_type = self.random_choice(&["PAYMENT", "CASH_IN", "CASH_OUT", "TRANSFER", "DEBIT"]);
        let amount = Self::round_cents(self.rng.gen_range(10.0..20_000.0));

        let old_balance_org = Self::round_cents(amount + self.rng.gen_range(0.0..50_000.0));
        let new_balance_org = if tx_type == "CASH_IN" {
            old_balance_org + amount
        } else {
            Self::round_cents(old_balance_org - amount)
        };
        let old_balance_dest = Self::round_cents(self.rng.gen_range(100.0..200_000.0));
        let new_balance_dest = if tx_type == "PAYMENT" {
            // merchants do not report balances
            old_balance_dest
        } else {
            old_balance_dest + amount
        };

        Row {
            step,
            tx_type,
            amount,
            name_orig: format!("C{:09}", self.rng.gen_range(0..1_000_000_000u64)),
            old_balance_org,
            new_balance_org,
            name_dest: format!(
                "{}{:09}",
                if tx_type == "PAYMENT" { "M" } else { "C" },
                self.rng.gen_range(0..1_000_000_000u64)
            ),
            old_balance_dest,
            new_balance_dest,
            is_fraud: 0,
            is_flagged_fraud: 0,
        }
    }

    /// Generate a fraudulent transaction: an account drained into a dormant one
    fn generate_fraud(&mut self) -> Row {
        let step = self.next_step();
        let tx_type = self.random_choice(&["TRANSFER", "CASH_OUT"]);
        let amount = Self::round_cents(self.rng.gen_range(5_000.0..500_000.0));

        Row {
            step,
            tx_type,
            amount,
            name_orig: format!("C{:09}", self.rng.gen_range(0..1_000_000_000u64)),
            old_balance_org: amount,
            new_balance_org: 0.0,
            name_dest: format!("C{:09}", self.rng.gen_range(0..1_000_000_000u64)),
            old_balance_dest: 0.0,
            new_balance_dest: 0.0,
            is_fraud: 1,
            is_flagged_fraud: u8::from(tx_type == "TRANSFER" && amount > 200_000.0),
        }
    }

    fn random_choice(&mut self, choices: &[&'static str]) -> &'static str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("generate_dataset=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if !(0.0..=1.0).contains(&args.fraud_rate) {
        anyhow::bail!("fraud rate must be in [0, 1], got {}", args.fraud_rate);
    }

    let sink: Box<dyn Write> = if args.output == "-" {
        Box::new(std::io::stdout().lock())
    } else {
        let path = PathBuf::from(&args.output);
        Box::new(
            std::fs::File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        )
    };
    let mut writer = csv::Writer::from_writer(sink);

    info!(
        count = args.count,
        fraud_rate = args.fraud_rate,
        seed = args.seed,
        "Generating dataset"
    );

    let mut generator = TransactionGenerator::new(args.seed);
    let mut label_rng = ChaCha8Rng::seed_from_u64(args.seed.wrapping_add(1));
    let mut fraud_count = 0u64;

    for i in 0..args.count {
        let row = if label_rng.gen_bool(args.fraud_rate) {
            fraud_count += 1;
            generator.generate_fraud()
        } else {
            generator.generate_legitimate()
        };
        writer.serialize(&row)?;

        if (i + 1) % 100_000 == 0 {
            info!(written = i + 1, fraud = fraud_count, "Progress");
        }
    }
    writer.flush()?;

    info!(
        rows = args.count,
        legitimate = args.count - fraud_count,
        fraud = fraud_count,
        "Dataset written"
    );
    Ok(())
}
