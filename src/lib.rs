//! altspeed — scheduled bandwidth-cap enforcer for Transmission.
//!
//! Meant to be run from cron, e.g. every 15 minutes:
//!
//! ```text
//! */15 * * * * altspeed --sqlite-file usage.sqlite3 \
//!     --transmission-url http://localhost:9091 --env-file .env --daily-limit 10g
//! ```
//!
//! Each run samples Transmission's lifetime transfer counters, reconstructs
//! "bytes used since T" over sliding daily/weekly/monthly windows from the
//! stored samples, and toggles the daemon's alt-speed mode when any
//! configured cap is exceeded. Accounting re-bases at the start of each
//! calendar month.

pub mod config;
pub mod engine;
pub mod error;
pub mod rpc;
pub mod store;
pub mod units;
pub mod window;

pub use config::{Config, Limits};
pub use engine::{Decision, ThrottleEngine};
pub use error::{LimiterError, Result};
pub use rpc::{BandwidthClient, RpcEndpoint, TransmissionClient, UsageSnapshot};
pub use store::{Sample, SampleStore};
