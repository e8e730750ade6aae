//! Randomness request book kept by the node.
//!
//! Wraps the [`RequestLedger`] with what the fulfiller needs to compute an
//! answer: the seed and word count of every request, plus the counter that
//! hands out request ids.

use std::collections::BTreeMap;

use request_ledger::{
    ForwarderId, FulfillmentGateway, GatewayError, LedgerError, RandomWords, Request, RequestId,
    RequestLedger, SystemClock,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// A registered randomness request, as queued for the fulfiller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomnessRequestedEvent {
    pub request_id: RequestId,
    pub seed: [u8; 32],
    pub num_words: u32,
    pub requested_at: u64,
}

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("num_words must be between 1 and {max}, got {requested}")]
    InvalidNumWords { requested: u32, max: u32 },
    /// The request counter would overflow u64 (practically unreachable).
    #[error("request counter overflow")]
    CounterOverflow,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Serialized form of the node's state, written after every mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub next_request: u64,
    pub requests: Vec<Request<RandomWords>>,
    pub events: Vec<RandomnessRequestedEvent>,
}

#[derive(Debug, Clone)]
pub struct Oracle {
    ledger: RequestLedger<RandomWords>,
    gateway: FulfillmentGateway,
    events: BTreeMap<RequestId, RandomnessRequestedEvent>,
    next_request: u64,
    max_num_words: u32,
}

impl Oracle {
    pub fn new(gateway: FulfillmentGateway, max_num_words: u32) -> Self {
        Self {
            ledger: RequestLedger::new(),
            gateway,
            events: BTreeMap::new(),
            next_request: 0,
            max_num_words,
        }
    }

    pub fn from_snapshot(
        snapshot: Snapshot,
        gateway: FulfillmentGateway,
        max_num_words: u32,
    ) -> Result<Self, OracleError> {
        let ledger = RequestLedger::restore(snapshot.requests, SystemClock)?;
        let events = snapshot
            .events
            .into_iter()
            .map(|event| (event.request_id, event))
            .collect();
        Ok(Self {
            ledger,
            gateway,
            events,
            next_request: snapshot.next_request,
            max_num_words,
        })
    }

    /// Assign the next request id and register it as pending.
    pub fn request(
        &mut self,
        seed: [u8; 32],
        num_words: u32,
    ) -> Result<RandomnessRequestedEvent, OracleError> {
        if num_words == 0 || num_words > self.max_num_words {
            return Err(OracleError::InvalidNumWords {
                requested: num_words,
                max: self.max_num_words,
            });
        }
        let next_request = self
            .next_request
            .checked_add(1)
            .ok_or(OracleError::CounterOverflow)?;

        let request_id = RequestId::from(self.next_request);
        let requested_at = self.ledger.register(request_id)?;
        self.next_request = next_request;

        let event = RandomnessRequestedEvent {
            request_id,
            seed,
            num_words,
            requested_at,
        };
        self.events.insert(request_id, event.clone());
        info!(request_id = %request_id, num_words, "Randomness requested");
        Ok(event)
    }

    /// Deliver random words through the gateway as `forwarder`.
    pub fn fulfill(
        &mut self,
        forwarder: &ForwarderId,
        request_id: RequestId,
        words: RandomWords,
    ) -> Result<(), OracleError> {
        self.gateway
            .fulfill(&mut self.ledger, forwarder, request_id, words)?;
        Ok(())
    }

    pub fn consume(&mut self, request_id: RequestId) -> Result<RandomWords, OracleError> {
        Ok(self.ledger.consume(request_id)?)
    }

    pub fn get(&self, request_id: &RequestId) -> Option<&Request<RandomWords>> {
        self.ledger.get(request_id)
    }

    pub fn len(&self) -> usize {
        self.ledger.len()
    }

    /// Requests still waiting for randomness, oldest id first.
    pub fn pending_events(&self) -> Vec<RandomnessRequestedEvent> {
        self.ledger
            .pending_ids()
            .iter()
            .filter_map(|id| self.events.get(id).cloned())
            .collect()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            next_request: self.next_request,
            requests: self.ledger.snapshot(),
            events: self.events.values().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> (Oracle, ForwarderId) {
        let forwarder = ForwarderId::new("node");
        let gateway = FulfillmentGateway::new([forwarder.clone()]);
        (Oracle::new(gateway, 4), forwarder)
    }

    #[test]
    fn ids_are_sequential() {
        let (mut oracle, _) = oracle();
        let first = oracle.request([0; 32], 1).unwrap();
        let second = oracle.request([0; 32], 2).unwrap();
        assert_eq!(first.request_id, RequestId::from(0));
        assert_eq!(second.request_id, RequestId::from(1));
        assert_eq!(oracle.pending_events(), vec![first, second]);
    }

    #[test]
    fn event_carries_ledger_timestamp() {
        let (mut oracle, _) = oracle();
        let event = oracle.request([0; 32], 1).unwrap();
        assert_eq!(
            oracle.get(&event.request_id).unwrap().requested_at,
            event.requested_at
        );
    }

    #[test]
    fn word_count_is_bounded() {
        let (mut oracle, _) = oracle();
        assert!(matches!(
            oracle.request([0; 32], 0),
            Err(OracleError::InvalidNumWords { requested: 0, max: 4 })
        ));
        assert!(matches!(
            oracle.request([0; 32], 5),
            Err(OracleError::InvalidNumWords { requested: 5, max: 4 })
        ));
        assert_eq!(oracle.len(), 0);
    }

    #[test]
    fn fulfill_then_consume() {
        let (mut oracle, forwarder) = oracle();
        let event = oracle.request([3; 32], 1).unwrap();
        oracle
            .fulfill(&forwarder, event.request_id, vec![[9; 32]])
            .unwrap();
        assert!(oracle.pending_events().is_empty());
        assert_eq!(oracle.consume(event.request_id).unwrap(), vec![[9; 32]]);
        assert!(matches!(
            oracle.consume(event.request_id),
            Err(OracleError::Ledger(LedgerError::AlreadyConsumed(_)))
        ));
    }

    #[test]
    fn foreign_forwarder_is_refused() {
        let (mut oracle, _) = oracle();
        let event = oracle.request([3; 32], 1).unwrap();
        let result = oracle.fulfill(&ForwarderId::new("mallory"), event.request_id, vec![]);
        assert!(matches!(
            result,
            Err(OracleError::Gateway(GatewayError::Unauthorized(_)))
        ));
        assert_eq!(oracle.pending_events().len(), 1);
    }

    #[test]
    fn snapshot_restores_counter_and_pending_work() {
        let (mut oracle, forwarder) = oracle();
        let first = oracle.request([1; 32], 1).unwrap();
        let second = oracle.request([2; 32], 1).unwrap();
        oracle.fulfill(&forwarder, first.request_id, vec![[0; 32]]).unwrap();

        let json = serde_json::to_string(&oracle.snapshot()).unwrap();
        let snapshot: Snapshot = serde_json::from_str(&json).unwrap();
        let mut restored =
            Oracle::from_snapshot(snapshot, FulfillmentGateway::new([forwarder]), 4).unwrap();

        assert_eq!(restored.pending_events(), vec![second]);
        let third = restored.request([3; 32], 1).unwrap();
        assert_eq!(third.request_id, RequestId::from(2));
    }
}
