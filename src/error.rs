use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors produced while reading one source directory.
///
/// These correspond to spec.md §4.1's "Failure semantics": everything here
/// aborts the run. A filename that merely fails to match a date pattern is
/// not an error at all — it is logged at `warn` and skipped (see
/// `source::logdir`).
#[derive(Debug, Error)]
pub enum LogdirError {
    #[error("failed to read directory '{path}': {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open '{path}': {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("'{path}': row is missing required column 'timestamp'")]
    MissingTimestamp { path: PathBuf },

    #[error("'{path}': unparseable intra-day timestamp '{value}': {source}")]
    BadTimestamp {
        path: PathBuf,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("'{path}': row is missing required column 'trade'")]
    MissingTrade { path: PathBuf },
}

/// Fatal errors produced while reconciling the N-way merged streams.
#[derive(Debug, Error)]
pub enum DiffError {
    #[error(transparent)]
    Logdir(#[from] LogdirError),

    #[error("duplicate trade '{trade_id}' observed twice from source {source_index}")]
    DuplicateTrade {
        trade_id: String,
        source_index: usize,
    },

    #[error(
        "source {source_index} record for trade '{trade_id}' is missing reconcile field '{field}'"
    )]
    MissingReconcileField {
        source_index: usize,
        trade_id: String,
        field: String,
    },

    #[error("invalid --reconcile_fields: {0}")]
    Cli(String),

    #[error("at least one logdir argument is required")]
    NoSources,
}
