//! Single-window usage evaluation.
//!
//! A window is the question "has more than `threshold` bytes been used since
//! `reference`?". The answer is reconstructed from sparse samples: the
//! baseline is the newest sample older than the reference, falling back to
//! the oldest sample on record when none is old enough. An empty store means
//! no judgement can be made and the window never throttles.

use chrono::{DateTime, Local, Utc};
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::SampleStore;
use crate::units::format_bytes;

/// Outcome of evaluating one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowVerdict {
    /// Whether usage since the baseline exceeded the threshold.
    pub exceeded: bool,
    /// Bytes used since the baseline sample. Negative if the client's
    /// cumulative counter went backwards (client reset); deliberately not
    /// clamped, which makes `exceeded` false in that case.
    pub usage_since: i64,
}

/// Evaluate one window against the store.
///
/// `is_currently_throttled` only affects log severity: an overage that the
/// client is not yet throttled for is logged at `warn`, everything else at
/// `debug`.
pub fn evaluate(
    store: &SampleStore,
    reference: DateTime<Utc>,
    current_usage: i64,
    threshold: i64,
    is_currently_throttled: bool,
) -> Result<WindowVerdict> {
    let baseline = match store.find_latest_before(reference)? {
        Some(sample) => sample,
        None => {
            debug!("no sample old enough for the window, using oldest sample");
            match store.find_earliest()? {
                Some(sample) => sample,
                None => {
                    debug!("time_slice table unpopulated, no determination can be made");
                    return Ok(WindowVerdict {
                        exceeded: false,
                        usage_since: 0,
                    });
                }
            }
        }
    };

    let usage_since = current_usage - baseline.data_usage;
    let exceeded = usage_since > threshold;
    let over = (usage_since - threshold).max(0);
    let since_local = baseline.timestamp.with_timezone(&Local);

    if exceeded && !is_currently_throttled {
        warn!(
            used = %format_bytes(usage_since),
            over = %format_bytes(over),
            limit = %format_bytes(threshold),
            since = %since_local,
            "window limit exceeded",
        );
    } else {
        debug!(
            used = %format_bytes(usage_since),
            over = %format_bytes(over),
            limit = %format_bytes(threshold),
            since = %since_local,
            "window evaluated",
        );
    }

    Ok(WindowVerdict {
        exceeded,
        usage_since,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Sample;
    use chrono::{Duration, TimeZone};

    const GIB: i64 = 1 << 30;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_store_never_throttles() {
        let store = SampleStore::open_in_memory().unwrap();
        let verdict = evaluate(&store, now() - Duration::days(1), i64::MAX, 0, false).unwrap();
        assert_eq!(
            verdict,
            WindowVerdict {
                exceeded: false,
                usage_since: 0
            }
        );
    }

    #[test]
    fn test_delta_against_single_older_sample() {
        let store = SampleStore::open_in_memory().unwrap();
        store
            .insert(&Sample {
                timestamp: now() - Duration::hours(2),
                data_usage: 5 * GIB,
            })
            .unwrap();

        // reference after the sample: it is the baseline
        let verdict = evaluate(
            &store,
            now() - Duration::hours(1),
            16 * GIB,
            10 * GIB,
            false,
        )
        .unwrap();
        assert_eq!(verdict.usage_since, 11 * GIB);
        assert!(verdict.exceeded);
    }

    #[test]
    fn test_falls_back_to_oldest_when_no_sample_old_enough() {
        let store = SampleStore::open_in_memory().unwrap();
        store
            .insert(&Sample {
                timestamp: now() - Duration::hours(2),
                data_usage: 5 * GIB,
            })
            .unwrap();
        store
            .insert(&Sample {
                timestamp: now() - Duration::hours(1),
                data_usage: 6 * GIB,
            })
            .unwrap();

        // Reference predates every sample: oldest sample is the baseline.
        let verdict = evaluate(&store, now() - Duration::days(1), 8 * GIB, GIB, false).unwrap();
        assert_eq!(verdict.usage_since, 3 * GIB);
        assert!(verdict.exceeded);
    }

    #[test]
    fn test_exactly_at_threshold_is_not_exceeded() {
        let store = SampleStore::open_in_memory().unwrap();
        store
            .insert(&Sample {
                timestamp: now() - Duration::hours(2),
                data_usage: 0,
            })
            .unwrap();
        let verdict = evaluate(&store, now(), 10 * GIB, 10 * GIB, false).unwrap();
        assert!(!verdict.exceeded, "strict > comparison");
        assert_eq!(verdict.usage_since, 10 * GIB);
    }

    #[test]
    fn test_negative_delta_flows_through_unclamped() {
        let store = SampleStore::open_in_memory().unwrap();
        store
            .insert(&Sample {
                timestamp: now() - Duration::hours(2),
                data_usage: 10 * GIB,
            })
            .unwrap();
        // Counter went backwards (client reset)
        let verdict = evaluate(&store, now(), 2 * GIB, GIB, false).unwrap();
        assert_eq!(verdict.usage_since, -8 * GIB);
        assert!(!verdict.exceeded);
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let store = SampleStore::open_in_memory().unwrap();
        store
            .insert(&Sample {
                timestamp: now() - Duration::hours(3),
                data_usage: 2 * GIB,
            })
            .unwrap();
        let a = evaluate(&store, now(), 5 * GIB, GIB, false).unwrap();
        let b = evaluate(&store, now(), 5 * GIB, GIB, false).unwrap();
        assert_eq!(a, b);
    }
}
