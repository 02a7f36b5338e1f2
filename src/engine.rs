//! Throttle decision engine.
//!
//! One run: read the client's counters once, evaluate every configured
//! window against the sample store, OR the verdicts into a single throttle
//! boolean, flip the client's alt-speed flag only on transitions, then
//! record the new sample (and optionally prune).
//!
//! Usage accounting restarts at the start of each calendar month (local
//! time): every window reference is clamped to never precede that boundary,
//! so a 30-day window asked for on the 3rd effectively starts on the 1st.

use chrono::{DateTime, Datelike, Duration, Local, TimeZone, Utc};
use tracing::{debug, info, warn};

use crate::config::Limits;
use crate::error::Result;
use crate::rpc::BandwidthClient;
use crate::store::{Sample, SampleStore};
use crate::window::{self, WindowVerdict};

/// Aggregated outcome of one run's window evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// True if any evaluated window was exceeded.
    pub throttle: bool,
    /// How many windows were evaluated (all configured windows, always —
    /// evaluation never short-circuits, each window logs its own state).
    pub windows_evaluated: usize,
}

/// Orchestrates window evaluation, flag application and sample recording.
pub struct ThrottleEngine {
    store: SampleStore,
    limits: Limits,
    clear_old_data: bool,
}

impl ThrottleEngine {
    pub fn new(store: SampleStore, limits: Limits, clear_old_data: bool) -> Self {
        Self {
            store,
            limits,
            clear_old_data,
        }
    }

    /// The underlying sample store.
    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    /// First instant of the current calendar month in local time, as UTC.
    pub fn reset_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&Local);
        // Midnight on the 1st can fall into a DST gap; take the first
        // representable hour of the day in that case.
        for hour in 0..3 {
            if let Some(t) = Local
                .with_ymd_and_hms(local.year(), local.month(), 1, hour, 0, 0)
                .earliest()
            {
                return t.with_timezone(&Utc);
            }
        }
        now
    }

    /// Pure decision over the current store contents: evaluates every
    /// configured window and ORs the verdicts. Does not write anything.
    pub fn decide(
        &self,
        now: DateTime<Utc>,
        current_usage: i64,
        is_currently_throttled: bool,
    ) -> Result<Decision> {
        let boundary = Self::reset_boundary(now);
        let reference = |d: Duration| std::cmp::max(boundary, now - d);

        let one_day_ago = reference(Duration::days(1));
        let one_week_ago = reference(Duration::weeks(1));
        let four_weeks_ago = reference(Duration::weeks(4));
        let one_month_ago = reference(Duration::days(30));

        let mut windows: Vec<(DateTime<Utc>, i64)> = Vec::new();
        if let Some(daily) = self.limits.daily {
            windows.push((one_day_ago, daily));
            windows.push((one_week_ago, daily * 7));
            windows.push((one_month_ago, daily * 30));
        }
        if let Some(weekly) = self.limits.weekly {
            windows.push((one_week_ago, weekly));
            windows.push((four_weeks_ago, weekly * 4));
        }
        if let Some(monthly) = self.limits.monthly {
            windows.push((one_month_ago, monthly));
        }

        let mut throttle = false;
        for (reference, threshold) in &windows {
            let WindowVerdict { exceeded, .. } = window::evaluate(
                &self.store,
                *reference,
                current_usage,
                *threshold,
                is_currently_throttled,
            )?;
            throttle |= exceeded;
        }

        Ok(Decision {
            throttle,
            windows_evaluated: windows.len(),
        })
    }

    /// Execute one full run against the client: snapshot, decide, apply the
    /// flag on transitions, record the sample, prune if configured.
    pub async fn run(&self, client: &dyn BandwidthClient, now: DateTime<Utc>) -> Result<Decision> {
        let snapshot = client.snapshot().await?;
        let decision = self.decide(now, snapshot.cumulative_bytes, snapshot.alt_speed_enabled)?;

        debug!(
            should_throttle = decision.throttle,
            currently_throttled = snapshot.alt_speed_enabled,
            "throttle verdict",
        );

        if decision.throttle && !snapshot.alt_speed_enabled {
            warn!("activating alt speed on Transmission");
            client.set_alt_speed(true).await?;
        } else if snapshot.alt_speed_enabled && !decision.throttle {
            info!("deactivating alt speed on Transmission");
            client.set_alt_speed(false).await?;
        }

        // Recorded on every run, throttled or not. A duplicate timestamp
        // here means overlapping invocations and is surfaced as fatal.
        self.store.insert(&Sample {
            timestamp: now,
            data_usage: snapshot.cumulative_bytes,
        })?;

        if self.clear_old_data {
            let removed = self.store.delete_before(Self::reset_boundary(now))?;
            if removed > 0 {
                info!(removed, "pruned samples older than the monthly reset boundary");
            }
        }

        Ok(decision)
    }
}
