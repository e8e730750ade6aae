use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpkeepError {
    #[error("upkeep not needed: {elapsed}s elapsed, interval {interval}s")]
    UpkeepNotNeeded { elapsed: u64, interval: u64 },
}

/// Time-based upkeep: runs once more than `interval` seconds have passed.
///
/// Automation nodes poll [`check_upkeep`](Self::check_upkeep) off-chain and
/// call [`perform_upkeep`](Self::perform_upkeep) when it returns `true`. The
/// perform step re-checks, since anyone may call it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalUpkeep {
    interval: u64,
    last_timestamp: u64,
    counter: u64,
}

impl IntervalUpkeep {
    pub fn new(interval: u64, now: u64) -> Self {
        Self {
            interval,
            last_timestamp: now,
            counter: 0,
        }
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn last_timestamp(&self) -> u64 {
        self.last_timestamp
    }

    pub fn check_upkeep(&self, now: u64) -> bool {
        now.saturating_sub(self.last_timestamp) > self.interval
    }

    /// Returns the new counter value.
    pub fn perform_upkeep(&mut self, now: u64) -> Result<u64, UpkeepError> {
        if !self.check_upkeep(now) {
            return Err(UpkeepError::UpkeepNotNeeded {
                elapsed: now.saturating_sub(self.last_timestamp),
                interval: self.interval,
            });
        }
        self.last_timestamp = now;
        self.counter += 1;
        info!(counter = self.counter, at = now, "Upkeep performed");
        Ok(self.counter)
    }
}
