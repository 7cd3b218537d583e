use chrono::Duration;
use tracing::info;

use crate::cli::args::Cli;
use crate::cli::output::format_discrepancy;
use crate::error::DiffError;
use crate::sequencer::{DiffConfig, NDiffer};
use crate::source::LogdirStream;

/// Build one `LogdirStream` per logdir argument, reconcile them with an
/// `NDiffer`, and print one formatted line per discrepancy to stdout.
pub fn run(cli: Cli) -> Result<(), DiffError> {
    let reconcile_fields = cli.reconcile_fields()?;

    info!(
        sources = cli.logdirs.len(),
        max_skew_seconds = cli.max_skew_seconds,
        extreme_skew_seconds = cli.extreme_skew_seconds,
        reconcile_fields = %reconcile_fields.join(","),
        "starting reconciliation"
    );

    let sources: Result<Vec<LogdirStream>, DiffError> = cli
        .logdirs
        .iter()
        .map(|path| {
            LogdirStream::new(path, Some(path.display().to_string())).map_err(DiffError::from)
        })
        .collect();
    let sources = sources?;

    let config = DiffConfig {
        max_skew: Duration::seconds(cli.max_skew_seconds),
        extreme_skew: Duration::seconds(cli.extreme_skew_seconds),
        reconcile_fields: reconcile_fields.clone(),
    };

    let differ = NDiffer::new(sources, config)?;
    let logdir_refs: Vec<&std::path::Path> = cli.logdirs.iter().map(|p| p.as_path()).collect();

    let mut discrepancy_count = 0u64;
    for discrepancy in differ {
        let discrepancy = discrepancy?;
        discrepancy_count += 1;
        println!(
            "{}",
            format_discrepancy(
                &discrepancy,
                &logdir_refs,
                &reconcile_fields,
                cli.include_details
            )
        );
    }

    info!(discrepancies = discrepancy_count, "reconciliation complete");
    Ok(())
}
