//! Utility functions for UUID generation and timestamp handling.

pub mod timestamps;
mod uuid_utils;

pub use timestamps::{before_now, elapsed_since, now_utc, Timestamp};
pub use uuid_utils::generate_uuid;
