//! Reporting: log broadcasting and batch counters.

pub mod logs;
pub mod stats;

pub use logs::*;
pub use stats::{BatchStats, StatsSnapshot, TableSnapshot, TableStats};
