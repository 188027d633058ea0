//! Timestamp helpers.
//!
//! All persisted times are UTC. Durations handed around by the engine are
//! `std::time::Duration`; conversions from chrono deltas clamp negative
//! values (clock skew between writers) to zero.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Represents a persisted timestamp.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Time elapsed since `ts`, zero if `ts` lies in the future.
#[must_use]
pub fn elapsed_since(ts: Timestamp) -> Duration {
    (Utc::now() - ts).to_std().unwrap_or(Duration::ZERO)
}

/// The timestamp `ago` before now.
#[must_use]
pub fn before_now(ago: Duration) -> Timestamp {
    let delta = TimeDelta::from_std(ago).unwrap_or(TimeDelta::zero());
    Utc::now() - delta
}
