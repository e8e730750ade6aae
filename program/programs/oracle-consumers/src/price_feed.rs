use request_ledger::{StalenessBound, StalenessError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// A single aggregator round as reported by a price feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundData {
    pub round_id: u64,
    /// Price scaled by `10^decimals`.
    pub answer: i128,
    pub started_at: u64,
    /// Zero while the round is incomplete.
    pub updated_at: u64,
    pub answered_in_round: u64,
}

/// Read side of a push-based price feed.
pub trait PriceFeed {
    fn decimals(&self) -> u8;
    fn description(&self) -> &str;
    fn latest_round_data(&self) -> RoundData;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceFeedError {
    #[error("feed answered a non-positive price: {0}")]
    NonPositiveAnswer(i128),
    #[error("round {0} has not completed")]
    IncompleteRound(u64),
    /// The answer was carried over from an earlier round.
    #[error("round {round_id} was answered in earlier round {answered_in_round}")]
    CarriedOverAnswer { round_id: u64, answered_in_round: u64 },
    #[error(transparent)]
    Staleness(#[from] StalenessError),
}

/// A validated price reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub answer: i128,
    pub decimals: u8,
    pub round_id: u64,
    pub updated_at: u64,
    /// Seconds between `updated_at` and the time of the read.
    pub age: u64,
}

impl Price {
    /// Rescale the answer to `decimals` places, truncating toward zero.
    pub fn scaled_to(&self, decimals: u8) -> Option<i128> {
        if decimals >= self.decimals {
            let factor = 10i128.checked_pow(u32::from(decimals - self.decimals))?;
            self.answer.checked_mul(factor)
        } else {
            let factor = 10i128.checked_pow(u32::from(self.decimals - decimals))?;
            Some(self.answer / factor)
        }
    }
}

/// Reads a [`PriceFeed`] and rejects answers that are unusable or too old.
#[derive(Debug, Clone)]
pub struct PriceConsumer<F> {
    feed: F,
    bound: StalenessBound,
}

impl<F: PriceFeed> PriceConsumer<F> {
    pub fn new(feed: F, bound: StalenessBound) -> Self {
        Self { feed, bound }
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// Latest price as of `now` (unix seconds).
    pub fn latest_price(&self, now: u64) -> Result<Price, PriceFeedError> {
        let round = self.feed.latest_round_data();

        if round.updated_at == 0 {
            return Err(PriceFeedError::IncompleteRound(round.round_id));
        }
        if round.answered_in_round < round.round_id {
            return Err(PriceFeedError::CarriedOverAnswer {
                round_id: round.round_id,
                answered_in_round: round.answered_in_round,
            });
        }
        if round.answer <= 0 {
            return Err(PriceFeedError::NonPositiveAnswer(round.answer));
        }
        let age = self.bound.check(round.updated_at, now).inspect_err(|e| {
            warn!(feed = self.feed.description(), round_id = round.round_id, error = %e, "Rejected price");
        })?;

        debug!(
            feed = self.feed.description(),
            round_id = round.round_id,
            answer = %round.answer,
            age,
            "Read price"
        );
        Ok(Price {
            answer: round.answer,
            decimals: self.feed.decimals(),
            round_id: round.round_id,
            updated_at: round.updated_at,
            age,
        })
    }
}
