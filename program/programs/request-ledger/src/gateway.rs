//! Caller authentication in front of [`RequestLedger::fulfill`].
//!
//! The ledger trusts whoever calls it. Transports that receive fulfillments
//! from the outside route them through a [`FulfillmentGateway`], which only
//! lets allow-listed forwarders through.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::clock::Clock;
use crate::errors::GatewayError;
use crate::ledger::RequestLedger;
use crate::state::RequestId;

/// Identity of a party delivering fulfillments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForwarderId(pub String);

impl ForwarderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ForwarderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Allow-list of forwarders permitted to fulfill requests.
#[derive(Debug, Clone, Default)]
pub struct FulfillmentGateway {
    allowed: BTreeSet<ForwarderId>,
}

impl FulfillmentGateway {
    pub fn new<I>(allowed: I) -> Self
    where
        I: IntoIterator<Item = ForwarderId>,
    {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    /// Returns `false` if the forwarder was already allowed.
    pub fn allow(&mut self, forwarder: ForwarderId) -> bool {
        self.allowed.insert(forwarder)
    }

    /// Returns `false` if the forwarder was not allowed.
    pub fn revoke(&mut self, forwarder: &ForwarderId) -> bool {
        self.allowed.remove(forwarder)
    }

    pub fn is_allowed(&self, forwarder: &ForwarderId) -> bool {
        self.allowed.contains(forwarder)
    }

    /// Check `caller` against the allow-list, then fulfill `id`.
    ///
    /// An unauthorized caller never reaches the ledger.
    pub fn fulfill<P, C: Clock>(
        &self,
        ledger: &mut RequestLedger<P, C>,
        caller: &ForwarderId,
        id: RequestId,
        payload: P,
    ) -> Result<(), GatewayError> {
        if !self.is_allowed(caller) {
            warn!(forwarder = %caller, request_id = %id, "Rejected fulfillment from unknown forwarder");
            return Err(GatewayError::Unauthorized(caller.clone()));
        }
        ledger.fulfill(id, payload)?;
        Ok(())
    }
}
