//! Shared utilities for the verdict engine.

pub mod logging;
pub mod stats;

pub use logging::{init_logging, try_init_logging, LogFormat, LoggingError};
pub use stats::{StatsCounter, StatsSnapshot};
