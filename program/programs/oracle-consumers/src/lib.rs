//! Consumers built on the request ledger.
//!
//! Each module shows one oracle integration pattern:
//!
//! - [`raffle`]: picks a winner from a pool with verifiable randomness.
//! - [`price_feed`]: reads a push-based price feed and rejects stale rounds.
//! - [`compute`]: sends an off-chain compute request and credits the result.
//! - [`cross_chain`]: receives messages from allow-listed chains and senders.
//! - [`upkeep`]: interval-gated automated upkeep.
//!
//! The request-driven consumers never touch ledger internals: they register
//! the id handed out by the oracle network, leave fulfillment to the
//! authenticated callback path and apply the payload through
//! [`RequestLedger::consume_with`](request_ledger::RequestLedger::consume_with).

pub mod compute;
pub mod cross_chain;
pub mod price_feed;
pub mod raffle;
pub mod upkeep;

pub use compute::{ComputeConsumer, ComputeError, ComputeResponse, WorkStatus};
pub use cross_chain::{ChainSelector, CrossChainError, CrossChainMessage, CrossChainReceiver, ReceivedPacket};
pub use price_feed::{Price, PriceConsumer, PriceFeed, PriceFeedError, RoundData};
pub use raffle::{Raffle, RaffleError, RaffleState};
pub use upkeep::{IntervalUpkeep, UpkeepError};
