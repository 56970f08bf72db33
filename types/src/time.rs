//! Timestamps for phase transitions and deadlines.
//!
//! The engine never reads a clock. Every operation receives `now` from the
//! caller, and deadline checks compare against it, so timeout-driven
//! transitions happen only when an external call observes them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix epoch seconds supplied by the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const EPOCH: Self = Self(0);

    pub fn new(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// This timestamp shifted forward, saturating at `u64::MAX`.
    pub fn plus(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// Seconds from this timestamp until `now` (zero if `now` is earlier).
    pub fn elapsed_since(&self, now: Timestamp) -> u64 {
        now.0.saturating_sub(self.0)
    }

    /// Whether `duration_secs` have fully elapsed since this timestamp.
    pub fn has_expired(&self, duration_secs: u64, now: Timestamp) -> bool {
        now >= self.plus(duration_secs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}
