//! Resolved run configuration.
//!
//! Everything is parsed and validated up front, before any I/O: limit
//! strings become byte counts, the endpoint URL is resolved, and the
//! at-least-one-limit rule is enforced. Components receive this struct
//! explicitly; nothing re-reads the command line later.

use std::path::PathBuf;

use crate::error::{LimiterError, Result};
use crate::rpc::RpcEndpoint;
use crate::units::{parse_quantity, Metric};

/// Configured data caps in bytes. At least one is always set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub daily: Option<i64>,
    pub weekly: Option<i64>,
    pub monthly: Option<i64>,
}

impl Limits {
    /// Parse the CLI limit strings (`"10g"` style). Errors if a string is
    /// malformed or if no limit is supplied at all.
    pub fn parse(
        daily: Option<&str>,
        weekly: Option<&str>,
        monthly: Option<&str>,
    ) -> Result<Self> {
        let parse = |s: Option<&str>| s.map(|s| parse_quantity(s, Metric::Data)).transpose();
        let limits = Self {
            daily: parse(daily)?,
            weekly: parse(weekly)?,
            monthly: parse(monthly)?,
        };
        if limits.daily.is_none() && limits.weekly.is_none() && limits.monthly.is_none() {
            return Err(LimiterError::Config(
                "a limit needs to be applied! run with --help for more information".to_string(),
            ));
        }
        Ok(limits)
    }
}

/// Fully resolved configuration for one run.
#[derive(Debug)]
pub struct Config {
    /// Path of the SQLite sample store.
    pub sqlite_file: PathBuf,
    /// Transmission RPC endpoint with credentials already attached.
    pub endpoint: RpcEndpoint,
    /// Parsed data caps.
    pub limits: Limits,
    /// Whether to prune samples older than the monthly reset boundary.
    pub clear_old_data: bool,
}
