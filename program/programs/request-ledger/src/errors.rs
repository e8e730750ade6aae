use thiserror::Error;

use crate::gateway::ForwarderId;
use crate::state::RequestId;

/// Result type alias using [`LedgerError`].
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Error codes for the request ledger.
///
/// Every variant is an ordering violation scoped to a single request id. None
/// of them are transient: the enclosing action must abort and must not retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The id was already registered. The existing entry is left untouched.
    #[error("Request {0} is already registered")]
    DuplicateRequest(RequestId),
    /// The id was never registered.
    #[error("Request {0} is unknown")]
    UnknownRequest(RequestId),
    /// A response has already been recorded for this id.
    #[error("Request {0} is already fulfilled")]
    AlreadyFulfilled(RequestId),
    /// Consumption was attempted before fulfillment.
    #[error("Request {0} is not fulfilled yet")]
    NotFulfilledYet(RequestId),
    /// The fulfilled payload has already been consumed.
    #[error("Request {0} is already consumed")]
    AlreadyConsumed(RequestId),
}

impl LedgerError {
    /// The request id the error is scoped to.
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::DuplicateRequest(id)
            | Self::UnknownRequest(id)
            | Self::AlreadyFulfilled(id)
            | Self::NotFulfilledYet(id)
            | Self::AlreadyConsumed(id) => *id,
        }
    }
}

/// Errors raised by the [`FulfillmentGateway`](crate::gateway::FulfillmentGateway).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The caller is not an allow-listed forwarder.
    #[error("Forwarder {0} is not allowed to fulfill requests")]
    Unauthorized(ForwarderId),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Errors raised when an observation fails its freshness check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StalenessError {
    #[error("observation is stale: observed at {observed_at}, now {now}, max age {max_age}s")]
    Stale {
        observed_at: u64,
        now: u64,
        max_age: u64,
    },
    /// Timestamp lies ahead of the local clock.
    #[error("observation at {observed_at} is ahead of now ({now})")]
    FromTheFuture { observed_at: u64, now: u64 },
}

/// Errors raised while parsing a [`RequestId`] from text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseRequestIdError {
    #[error("request id must be 0x-prefixed hex, got {0:?}")]
    MissingPrefix(String),
    #[error("request id has {0} hex digits, at most 64 allowed")]
    TooLong(usize),
    #[error("invalid hex digit {0:?} in request id")]
    InvalidDigit(char),
}
