//! Momentum scanner.
//!
//! Picks the first instrument from the "ranked by percentage gain" list
//! that rose between the configured bounds on enough volume, skipping
//! anything already bought today.

use chrono::NaiveTime;
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::ScalpConfig;
use crate::types::RankedInstrument;

/// Rate and volume bounds for a scalp candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentumFilter {
    /// Percent, inclusive.
    pub min_change_rate: Decimal,
    /// Percent, inclusive. Keeps limit-up names out.
    pub max_change_rate: Decimal,
    /// Exclusive.
    pub min_volume: u64,
}

impl MomentumFilter {
    pub fn from_config(cfg: &ScalpConfig) -> Self {
        Self {
            min_change_rate: cfg.min_change_rate,
            max_change_rate: cfg.max_change_rate,
            min_volume: cfg.min_volume,
        }
    }

    pub fn matches(&self, item: &RankedInstrument) -> bool {
        item.change_rate >= self.min_change_rate
            && item.change_rate <= self.max_change_rate
            && item.volume > self.min_volume
    }

    /// First match in ranked order that `is_held` does not exclude.
    pub fn pick<'a, F>(&self, ranked: &'a [RankedInstrument], is_held: F) -> Option<&'a RankedInstrument>
    where
        F: Fn(&str) -> bool,
    {
        for item in ranked {
            if !self.matches(item) {
                continue;
            }
            if is_held(&item.code) {
                debug!(code = %item.code, "Already bought today, skipping");
                continue;
            }
            return Some(item);
        }
        None
    }
}

impl Default for MomentumFilter {
    fn default() -> Self {
        Self::from_config(&ScalpConfig::default())
    }
}

/// `start <= t < end`.
pub fn in_window(t: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    t >= start && t < end
}
