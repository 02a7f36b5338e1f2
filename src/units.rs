//! Human-readable size and time quantities.
//!
//! Limits arrive on the command line as strings like `10g` or `500m`;
//! [`parse_quantity`] turns them into integer bytes (or seconds), and
//! [`format_bytes`] renders byte counts back into the same notation for log
//! lines. Data units are powers of 1024, time units are seconds.

use std::str::FromStr;

use crate::error::{LimiterError, Result};

/// Which unit table a quantity string is parsed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Byte quantities: b / k / m / g / t, powers of 1024.
    Data,
    /// Durations: m / h / d / w, in seconds.
    Time,
}

impl FromStr for Metric {
    type Err = LimiterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "data" => Ok(Metric::Data),
            "time" => Ok(Metric::Time),
            other => Err(LimiterError::InvalidMetricKind(other.to_string())),
        }
    }
}

/// Data denominations, smallest first. Order matters for [`format_bytes`]:
/// the last entry whose quotient is still >= 1 wins.
const DATA_UNITS: [(char, i64); 5] = [
    ('b', 1),
    ('k', 1 << 10),
    ('m', 1 << 20),
    ('g', 1 << 30),
    ('t', 1i64 << 40),
];

const TIME_UNITS: [(char, i64); 4] = [
    ('m', 60),
    ('h', 60 * 60),
    ('d', 60 * 60 * 24),
    ('w', 60 * 60 * 24 * 7),
];

fn unit_table(metric: Metric) -> &'static [(char, i64)] {
    match metric {
        Metric::Data => &DATA_UNITS,
        Metric::Time => &TIME_UNITS,
    }
}

/// Parse a quantity string like `40m`, `500G` or `30d` into an integer
/// count of base units (bytes for [`Metric::Data`], seconds for
/// [`Metric::Time`]).
///
/// The numeric prefix may carry a decimal point (`1.5M`); matching is
/// case-insensitive. Returns [`LimiterError::InvalidUnitFormat`] when the
/// string has no recognized unit letter or no parseable number.
pub fn parse_quantity(text: &str, metric: Metric) -> Result<i64> {
    let lowered = text.to_ascii_lowercase();
    let units = unit_table(metric);

    let number: String = lowered
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let number: f64 = number
        .parse()
        .map_err(|_| LimiterError::InvalidUnitFormat(text.to_string()))?;

    let multiplier = lowered
        .chars()
        .find_map(|c| units.iter().find(|(u, _)| *u == c).map(|(_, m)| *m))
        .ok_or_else(|| LimiterError::InvalidUnitFormat(text.to_string()))?;

    Ok((number * multiplier as f64).round() as i64)
}

/// Render a byte count as the largest denomination still >= 1, two decimal
/// places, uppercase unit letter: `11811160064` → `"11.00G"`.
///
/// Zero and negative counts (a counter that went backwards) fall back to the
/// byte unit: `0` → `"0.00B"`, `-512` → `"-512.00B"`.
pub fn format_bytes(byte_amount: i64) -> String {
    let mut value = byte_amount as f64;
    let mut letter = 'b';
    for (unit, size) in DATA_UNITS {
        let quotient = byte_amount as f64 / size as f64;
        if quotient >= 1.0 {
            value = quotient;
            letter = unit;
        }
    }
    format!("{:.2}{}", value, letter.to_ascii_uppercase())
}
