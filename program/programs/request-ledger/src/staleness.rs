use serde::{Deserialize, Serialize};

use crate::errors::StalenessError;

/// Maximum acceptable age of an externally supplied observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessBound {
    pub max_age_secs: u64,
}

impl StalenessBound {
    pub const fn new(max_age_secs: u64) -> Self {
        Self { max_age_secs }
    }

    /// Returns the observation's age if it is within the bound.
    ///
    /// An age exactly equal to `max_age_secs` is still accepted.
    pub fn check(&self, observed_at: u64, now: u64) -> Result<u64, StalenessError> {
        let age = now
            .checked_sub(observed_at)
            .ok_or(StalenessError::FromTheFuture { observed_at, now })?;
        if age > self.max_age_secs {
            return Err(StalenessError::Stale {
                observed_at,
                now,
                max_age: self.max_age_secs,
            });
        }
        Ok(age)
    }
}
