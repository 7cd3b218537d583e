use std::path::PathBuf;

use clap::Parser;

use crate::error::DiffError;

/// Reconcile trade records observed independently across N logging streams.
#[derive(Parser, Debug)]
#[command(name = "diff_trades", about = "N-way trade record reconciler", long_about = None)]
pub struct Cli {
    /// One log directory per source, in the order its records should be
    /// reported.
    #[arg(required = true)]
    pub logdirs: Vec<PathBuf>,

    /// Allowable delta between a trade's records before it is tagged a
    /// `timestamp` discrepancy.
    #[arg(long = "max_skew_seconds", default_value_t = 900)]
    pub max_skew_seconds: i64,

    /// Maximum delta before a still-missing record is evicted and reported.
    #[arg(long = "extreme_skew_seconds", default_value_t = 3600)]
    pub extreme_skew_seconds: i64,

    /// Comma-separated fields to reconcile in addition to timestamp.
    #[arg(long = "reconcile_fields", default_value = "symbol,price,quantity")]
    pub reconcile_fields: String,

    /// Include the full per-source records for each discrepancy.
    #[arg(long = "include_details")]
    pub include_details: bool,
}

impl Cli {
    pub fn reconcile_fields(&self) -> Result<Vec<String>, DiffError> {
        let fields: Vec<String> = self
            .reconcile_fields
            .split(',')
            .map(|f| f.to_string())
            .collect();

        if fields.iter().any(|f| f.is_empty()) {
            return Err(DiffError::Cli(format!(
                "--reconcile_fields contains an empty field name: '{}'",
                self.reconcile_fields
            )));
        }

        Ok(fields)
    }
}
