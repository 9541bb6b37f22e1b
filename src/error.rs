use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failure to turn the data file into records.
///
/// A missing file is not a `ParseError`; the cache reports it as
/// [`LoadOutcome::NoData`](crate::cache::LoadOutcome::NoData).
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("could not read data file: {0}")]
    Io(#[from] io::Error),
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {line} has {found} fields but the header declares {expected}")]
    RaggedRow {
        line: u64,
        expected: usize,
        found: usize,
    },
}

/// Failure of the external producer step.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("failed to launch producer '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("producer timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("producer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}
