//! # Scheduling Lanes
//!
//! Lanes are static scheduling partitions. They share the machine pool and
//! differ only in concurrency cap and priority band.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named scheduling partition a job runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// Paying tiers with small payloads
    Premium,
    /// Everyone else with small payloads
    Normal,
    /// Payloads above the large-file threshold, regardless of tier
    Large,
}

impl Lane {
    /// All lanes in a stable order
    pub const ALL: [Lane; 3] = [Lane::Premium, Lane::Normal, Lane::Large];

    pub fn name(&self) -> &'static str {
        match self {
            Lane::Premium => "premium",
            Lane::Normal => "normal",
            Lane::Large => "large",
        }
    }

    /// Inclusive range of priorities jobs in this lane can carry
    pub fn priority_band(&self) -> (u8, u8) {
        match self {
            Lane::Premium => (1, 2),
            Lane::Normal => (3, 3),
            Lane::Large => (1, 3),
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
