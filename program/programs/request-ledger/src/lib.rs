//! Request ledger for oracle integrations.
//!
//! Correlates an asynchronous call to an external computation provider with
//! its eventual response. A consumer registers the id it was handed by the
//! provider, the provider's authenticated callback fulfills it, and the
//! consumer applies the result exactly once.
//!
//! ```
//! use request_ledger::{LedgerError, RequestId, RequestLedger};
//!
//! let mut ledger = RequestLedger::new();
//! let id = RequestId::from(42);
//! ledger.register(id)?;
//! ledger.fulfill(id, 100u64)?;
//! assert_eq!(ledger.consume(id)?, 100);
//! assert_eq!(ledger.consume(id), Err(LedgerError::AlreadyConsumed(id)));
//! # Ok::<(), LedgerError>(())
//! ```

pub mod clock;
pub mod errors;
pub mod gateway;
pub mod ledger;
pub mod randomness;
pub mod staleness;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{GatewayError, LedgerError, ParseRequestIdError, Result, StalenessError};
pub use gateway::{ForwarderId, FulfillmentGateway};
pub use ledger::RequestLedger;
pub use randomness::{expand_randomness, select_index, select_index_wide, word_to_u64, RandomWords};
pub use staleness::StalenessBound;
pub use state::{Request, RequestId, RequestStatus};
