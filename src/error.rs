//! Error types for altspeed.
//!
//! Every error here is fatal for the current run: nothing is retried
//! internally, and the binary exits non-zero so the invoking scheduler sees
//! the failure. The next cron invocation is the retry mechanism.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LimiterError>;

/// All failure modes of a single limiter run.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// Invalid or incomplete configuration (e.g. no limit supplied).
    /// Raised before any I/O happens.
    #[error("configuration error: {0}")]
    Config(String),

    /// A size/time string had no recognized unit letter or numeric prefix.
    #[error("invalid unit format: {0} (expected e.g. '5.5T', '500G', '1000M')")]
    InvalidUnitFormat(String),

    /// A metric name was neither `data` nor `time`.
    #[error("invalid metric kind: {0} (must be 'data' or 'time')")]
    InvalidMetricKind(String),

    /// A sample with this exact timestamp already exists. Indicates
    /// overlapping runs; propagated rather than skipped.
    #[error("duplicate sample timestamp: {0}")]
    DuplicateTimestamp(String),

    /// The SQLite store could not be opened or a statement failed.
    #[error("sample store error: {0}")]
    Store(String),

    /// The Transmission RPC endpoint was unreachable or returned a failure.
    #[error("transmission rpc error: {0}")]
    Rpc(String),
}

impl From<rusqlite::Error> for LimiterError {
    fn from(e: rusqlite::Error) -> Self {
        LimiterError::Store(e.to_string())
    }
}

impl From<reqwest::Error> for LimiterError {
    fn from(e: reqwest::Error) -> Self {
        LimiterError::Rpc(e.to_string())
    }
}
