//! End-to-end decision scenarios: engine + store + a mock RPC client.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use altspeed::{
    BandwidthClient, Limits, LimiterError, Result, Sample, SampleStore, ThrottleEngine,
    UsageSnapshot,
};

const GIB: i64 = 1 << 30;

/// Mock client with a fixed snapshot; records every alt-speed write.
struct MockClient {
    snapshot: UsageSnapshot,
    set_calls: Mutex<Vec<bool>>,
}

impl MockClient {
    fn new(cumulative_bytes: i64, alt_speed_enabled: bool) -> Self {
        Self {
            snapshot: UsageSnapshot {
                cumulative_bytes,
                alt_speed_enabled,
            },
            set_calls: Mutex::new(Vec::new()),
        }
    }

    fn set_calls(&self) -> Vec<bool> {
        self.set_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BandwidthClient for MockClient {
    async fn snapshot(&self) -> Result<UsageSnapshot> {
        Ok(self.snapshot)
    }

    async fn set_alt_speed(&self, enabled: bool) -> Result<()> {
        self.set_calls.lock().unwrap().push(enabled);
        Ok(())
    }
}

/// Mid-month noon UTC keeps the local month start safely between 1 and 14
/// days in the past regardless of the host timezone.
fn mid_month() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
}

fn daily(limit: i64) -> Limits {
    Limits {
        daily: Some(limit),
        weekly: None,
        monthly: None,
    }
}

fn engine_with(limits: Limits, clear_old_data: bool, samples: &[(DateTime<Utc>, i64)]) -> ThrottleEngine {
    let store = SampleStore::open_in_memory().unwrap();
    for (timestamp, data_usage) in samples {
        store
            .insert(&Sample {
                timestamp: *timestamp,
                data_usage: *data_usage,
            })
            .unwrap();
    }
    ThrottleEngine::new(store, limits, clear_old_data)
}

#[tokio::test]
async fn overage_enables_alt_speed() {
    let now = mid_month();
    // 5 GiB two hours ago, 16 GiB now: 11 GiB over a 10 GiB daily cap.
    let engine = engine_with(
        daily(10 * GIB),
        false,
        &[(now - Duration::hours(2), 5 * GIB)],
    );
    let client = MockClient::new(16 * GIB, false);

    let decision = engine.run(&client, now).await.unwrap();

    assert!(decision.throttle);
    assert_eq!(client.set_calls(), vec![true]);
}

#[tokio::test]
async fn first_run_records_but_never_throttles() {
    let now = mid_month();
    let engine = engine_with(daily(1), false, &[]);
    let client = MockClient::new(i64::MAX / 2, false);

    let decision = engine.run(&client, now).await.unwrap();

    assert!(!decision.throttle, "empty store cannot be judged");
    assert!(client.set_calls().is_empty());
    // The run's sample was recorded regardless.
    let recorded = engine.store().find_earliest().unwrap().unwrap();
    assert_eq!(recorded.timestamp, now);
    assert_eq!(recorded.data_usage, i64::MAX / 2);
}

#[tokio::test]
async fn already_throttled_stays_without_rpc_write() {
    let now = mid_month();
    let engine = engine_with(
        daily(10 * GIB),
        false,
        &[(now - Duration::hours(2), 5 * GIB)],
    );
    // Still over the cap, already throttled: no transition, no write.
    let client = MockClient::new(16 * GIB, true);

    let decision = engine.run(&client, now).await.unwrap();

    assert!(decision.throttle);
    assert!(client.set_calls().is_empty());
}

#[tokio::test]
async fn usage_back_under_cap_disables_alt_speed() {
    let now = mid_month();
    let engine = engine_with(
        daily(10 * GIB),
        false,
        &[(now - Duration::hours(2), 5 * GIB)],
    );
    // Only 1 GiB used since the baseline but throttling is still on.
    let client = MockClient::new(6 * GIB, true);

    let decision = engine.run(&client, now).await.unwrap();

    assert!(!decision.throttle);
    assert_eq!(client.set_calls(), vec![false]);
}

#[tokio::test]
async fn under_cap_and_unthrottled_is_a_no_op_write_wise() {
    let now = mid_month();
    let engine = engine_with(
        daily(10 * GIB),
        false,
        &[(now - Duration::hours(2), 5 * GIB)],
    );
    let client = MockClient::new(6 * GIB, false);

    let decision = engine.run(&client, now).await.unwrap();

    assert!(!decision.throttle);
    assert!(client.set_calls().is_empty());
}

#[tokio::test]
async fn counter_reset_reads_as_negative_and_unthrottles() {
    let now = mid_month();
    // Baseline far above the current counter: the daemon was reset.
    let engine = engine_with(
        daily(10 * GIB),
        false,
        &[(now - Duration::hours(2), 100 * GIB)],
    );
    let client = MockClient::new(2 * GIB, true);

    let decision = engine.run(&client, now).await.unwrap();

    assert!(!decision.throttle, "negative usage cannot exceed a cap");
    assert_eq!(client.set_calls(), vec![false]);
}

#[tokio::test]
async fn overlapping_runs_surface_duplicate_timestamp() {
    let now = mid_month();
    let engine = engine_with(daily(10 * GIB), false, &[]);
    let client = MockClient::new(GIB, false);

    engine.run(&client, now).await.unwrap();
    let err = engine.run(&client, now).await.unwrap_err();

    assert!(
        matches!(err, LimiterError::DuplicateTimestamp(_)),
        "expected DuplicateTimestamp, got {err:?}"
    );
}

#[tokio::test]
async fn pruning_removes_only_pre_boundary_samples() {
    let now = mid_month();
    let boundary = ThrottleEngine::reset_boundary(now);
    let engine = engine_with(
        daily(10 * GIB),
        true,
        &[
            (boundary - Duration::days(3), GIB),
            (boundary - Duration::hours(1), 2 * GIB),
            (boundary + Duration::hours(1), 3 * GIB),
        ],
    );
    let client = MockClient::new(4 * GIB, false);

    engine.run(&client, now).await.unwrap();

    // Both pre-boundary samples are gone; the post-boundary one survives.
    let earliest = engine.store().find_earliest().unwrap().unwrap();
    assert_eq!(earliest.timestamp, boundary + Duration::hours(1));
}

#[tokio::test]
async fn pruning_never_removes_a_reachable_baseline() {
    let now = mid_month();
    let boundary = ThrottleEngine::reset_boundary(now);
    let engine = engine_with(
        daily(10 * GIB),
        true,
        &[(boundary + Duration::hours(1), 0)],
    );
    let client = MockClient::new(GIB, false);

    engine.run(&client, now).await.unwrap();

    // A fresh decision still finds the baseline the windows would use.
    let decision = engine.decide(now + Duration::minutes(1), 2 * GIB, false).unwrap();
    assert!(!decision.throttle);
    assert!(engine
        .store()
        .find_latest_before(now)
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn monthly_window_is_clamped_to_reset_boundary() {
    let now = mid_month();
    let boundary = ThrottleEngine::reset_boundary(now);
    // 200 GiB consumed last month, 1 GiB since. The clamped monthly
    // reference is the boundary, whose baseline is the last pre-boundary
    // sample — so only this month's 1 GiB counts.
    let engine = engine_with(
        Limits {
            daily: None,
            weekly: None,
            monthly: Some(50 * GIB),
        },
        false,
        &[
            (boundary - Duration::days(12), 0),
            (boundary - Duration::minutes(5), 200 * GIB),
        ],
    );
    let client = MockClient::new(201 * GIB, false);

    let decision = engine.run(&client, now).await.unwrap();

    assert!(
        !decision.throttle,
        "last month's usage must not count against this month's window"
    );
}
