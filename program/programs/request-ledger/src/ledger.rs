use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::mem;

use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::errors::{LedgerError, Result};
use crate::state::{Request, RequestId, RequestStatus};

/// In-memory ledger of asynchronous requests keyed by [`RequestId`].
///
/// ## Request lifecycle
///
/// 1. **Register**: the initiator obtains an id from the external provider
///    and records it with [`register`](Self::register); status is `Pending`.
/// 2. **Fulfill**: the authenticated callback path delivers the response
///    with [`fulfill`](Self::fulfill); status transitions to `Fulfilled`.
/// 3. **Consume**: the domain consumer takes the payload with
///    [`consume`](Self::consume) or [`consume_with`](Self::consume_with);
///    status transitions to `Consumed`.
///
/// Entries are never removed. Every operation either completes its transition
/// or returns an error with the ledger unchanged.
#[derive(Debug, Clone)]
pub struct RequestLedger<P, C = SystemClock> {
    requests: HashMap<RequestId, Request<P>>,
    clock: C,
}

impl<P> RequestLedger<P, SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<P> Default for RequestLedger<P, SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, C: Clock> RequestLedger<P, C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            requests: HashMap::new(),
            clock,
        }
    }

    /// Rebuild a ledger from a previous [`snapshot`](Self::snapshot).
    ///
    /// Fails with [`LedgerError::DuplicateRequest`] if the same id appears twice.
    pub fn restore<I>(requests: I, clock: C) -> Result<Self>
    where
        I: IntoIterator<Item = Request<P>>,
    {
        let mut ledger = Self::with_clock(clock);
        for request in requests {
            match ledger.requests.entry(request.id) {
                Entry::Occupied(_) => return Err(LedgerError::DuplicateRequest(request.id)),
                Entry::Vacant(slot) => {
                    slot.insert(request);
                }
            }
        }
        debug!(count = ledger.requests.len(), "Restored request ledger");
        Ok(ledger)
    }

    /// Record a freshly issued request as `Pending` and return its
    /// `requested_at` timestamp.
    pub fn register(&mut self, id: RequestId) -> Result<u64> {
        let now = self.clock.now();
        match self.requests.entry(id) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateRequest(id)),
            Entry::Vacant(slot) => {
                slot.insert(Request::pending(id, now));
                info!(request_id = %id, requested_at = now, "Request registered");
                Ok(now)
            }
        }
    }

    /// Record the response for a pending request.
    ///
    /// The caller must already be authenticated; see
    /// [`FulfillmentGateway`](crate::gateway::FulfillmentGateway).
    pub fn fulfill(&mut self, id: RequestId, payload: P) -> Result<()> {
        let now = self.clock.now();
        let request = self
            .requests
            .get_mut(&id)
            .ok_or(LedgerError::UnknownRequest(id))?;
        if request.is_fulfilled() {
            return Err(LedgerError::AlreadyFulfilled(id));
        }

        request.status = RequestStatus::Fulfilled { payload };
        request.fulfilled_at = Some(now);
        info!(request_id = %id, fulfilled_at = now, "Request fulfilled");
        Ok(())
    }

    /// Mark a fulfilled request consumed and hand back a copy of its payload.
    pub fn consume(&mut self, id: RequestId) -> Result<P>
    where
        P: Clone,
    {
        self.consume_with(id, |payload| Ok::<_, LedgerError>(payload.clone()))
    }

    /// Apply `effect` to a fulfilled payload, then mark the request consumed.
    ///
    /// If `effect` fails the request stays `Fulfilled` and may be consumed
    /// later; the error is returned as-is.
    pub fn consume_with<T, E, F>(&mut self, id: RequestId, effect: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&P) -> std::result::Result<T, E>,
        E: From<LedgerError>,
    {
        let now = self.clock.now();
        let request = self
            .requests
            .get_mut(&id)
            .ok_or(LedgerError::UnknownRequest(id))?;
        let output = match &request.status {
            RequestStatus::Pending => return Err(LedgerError::NotFulfilledYet(id).into()),
            RequestStatus::Consumed { .. } => return Err(LedgerError::AlreadyConsumed(id).into()),
            RequestStatus::Fulfilled { payload } => effect(payload)?,
        };

        request.status = match mem::replace(&mut request.status, RequestStatus::Pending) {
            RequestStatus::Fulfilled { payload } => RequestStatus::Consumed { payload },
            other => other,
        };
        request.consumed_at = Some(now);
        info!(request_id = %id, consumed_at = now, "Request consumed");
        Ok(output)
    }

    pub fn get(&self, id: &RequestId) -> Option<&Request<P>> {
        self.requests.get(id)
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.requests.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Iterate over all entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Request<P>> {
        self.requests.values()
    }

    /// Ids still awaiting fulfillment, in ascending order.
    pub fn pending_ids(&self) -> Vec<RequestId> {
        let mut ids: Vec<_> = self
            .requests
            .values()
            .filter(|r| !r.is_fulfilled())
            .map(|r| r.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Copy of every entry, ordered by id.
    pub fn snapshot(&self) -> Vec<Request<P>>
    where
        P: Clone,
    {
        let mut requests: Vec<_> = self.requests.values().cloned().collect();
        requests.sort_unstable_by_key(|r| r.id);
        requests
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn ledger() -> RequestLedger<u64, ManualClock> {
        RequestLedger::with_clock(ManualClock::new(1_000))
    }

    fn id(n: u64) -> RequestId {
        RequestId::from(n)
    }

    #[test]
    fn register_returns_requested_at() {
        let mut ledger = ledger();
        assert_eq!(ledger.register(id(1)), Ok(1_000));
        ledger.clock().advance(5);
        assert_eq!(ledger.register(id(2)), Ok(1_005));
        assert_eq!(ledger.get(&id(2)).unwrap().requested_at, 1_005);
    }

    #[test]
    fn register_twice_is_duplicate() {
        let mut ledger = ledger();
        ledger.register(id(1)).unwrap();
        assert_eq!(ledger.register(id(1)), Err(LedgerError::DuplicateRequest(id(1))));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn duplicate_register_does_not_reset_fulfilled_request() {
        let mut ledger = ledger();
        ledger.register(id(1)).unwrap();
        ledger.fulfill(id(1), 9).unwrap();
        assert!(ledger.register(id(1)).is_err());
        assert_eq!(ledger.get(&id(1)).unwrap().payload(), Some(&9));
    }

    #[test]
    fn fulfill_unknown_request() {
        let mut ledger = ledger();
        assert_eq!(ledger.fulfill(id(3), 1), Err(LedgerError::UnknownRequest(id(3))));
        assert!(ledger.is_empty());
    }

    #[test]
    fn second_fulfill_keeps_first_payload() {
        let mut ledger = ledger();
        ledger.register(id(5)).unwrap();
        ledger.fulfill(id(5), 11).unwrap();
        assert_eq!(ledger.fulfill(id(5), 22), Err(LedgerError::AlreadyFulfilled(id(5))));
        assert_eq!(ledger.get(&id(5)).unwrap().payload(), Some(&11));
    }

    #[test]
    fn fulfill_after_consume_is_already_fulfilled() {
        let mut ledger = ledger();
        ledger.register(id(5)).unwrap();
        ledger.fulfill(id(5), 11).unwrap();
        ledger.consume(id(5)).unwrap();
        assert_eq!(ledger.fulfill(id(5), 22), Err(LedgerError::AlreadyFulfilled(id(5))));
    }

    #[test]
    fn consume_before_fulfill() {
        let mut ledger = ledger();
        ledger.register(id(8)).unwrap();
        assert_eq!(ledger.consume(id(8)), Err(LedgerError::NotFulfilledYet(id(8))));
        assert!(!ledger.get(&id(8)).unwrap().is_consumed());
    }

    #[test]
    fn consume_unknown_request() {
        let mut ledger = ledger();
        assert_eq!(ledger.consume(id(8)), Err(LedgerError::UnknownRequest(id(8))));
    }

    #[test]
    fn consume_succeeds_exactly_once() {
        let mut ledger = ledger();
        ledger.register(id(42)).unwrap();
        ledger.fulfill(id(42), 100).unwrap();
        assert_eq!(ledger.consume(id(42)), Ok(100));
        assert_eq!(ledger.consume(id(42)), Err(LedgerError::AlreadyConsumed(id(42))));

        let request = ledger.get(&id(42)).unwrap();
        assert!(request.is_consumed());
        assert_eq!(request.payload(), Some(&100));
    }

    #[test]
    fn consume_becomes_possible_after_fulfill() {
        let mut ledger = ledger();
        ledger.register(id(7)).unwrap();
        assert_eq!(ledger.consume(id(7)), Err(LedgerError::NotFulfilledYet(id(7))));
        ledger.fulfill(id(7), 5).unwrap();
        assert_eq!(ledger.consume(id(7)), Ok(5));
    }

    #[derive(Debug, PartialEq)]
    enum EffectError {
        Rejected,
        Ledger(LedgerError),
    }

    impl From<LedgerError> for EffectError {
        fn from(e: LedgerError) -> Self {
            Self::Ledger(e)
        }
    }

    #[test]
    fn failed_effect_leaves_request_fulfilled() {
        let mut ledger = ledger();
        ledger.register(id(2)).unwrap();
        ledger.fulfill(id(2), 3).unwrap();

        let result: std::result::Result<(), _> =
            ledger.consume_with(id(2), |_| Err(EffectError::Rejected));
        assert_eq!(result, Err(EffectError::Rejected));
        let request = ledger.get(&id(2)).unwrap();
        assert!(!request.is_consumed());
        assert_eq!(request.consumed_at, None);

        let doubled = ledger.consume_with(id(2), |p| Ok::<_, EffectError>(p * 2));
        assert_eq!(doubled, Ok(6));
    }

    #[test]
    fn consume_with_does_not_run_effect_on_pending() {
        let mut ledger = ledger();
        ledger.register(id(2)).unwrap();
        let mut ran = false;
        let result = ledger.consume_with(id(2), |_| {
            ran = true;
            Ok::<_, EffectError>(())
        });
        assert_eq!(result, Err(EffectError::Ledger(LedgerError::NotFulfilledYet(id(2)))));
        assert!(!ran);
    }

    #[test]
    fn transitions_are_timestamped() {
        let clock = ManualClock::new(100);
        let mut ledger = RequestLedger::with_clock(clock.clone());
        ledger.register(id(1)).unwrap();
        clock.advance(30);
        ledger.fulfill(id(1), 0u64).unwrap();
        clock.advance(5);
        ledger.consume(id(1)).unwrap();

        let request = ledger.get(&id(1)).unwrap();
        assert_eq!(request.requested_at, 100);
        assert_eq!(request.fulfilled_at, Some(130));
        assert_eq!(request.consumed_at, Some(135));
    }

    #[test]
    fn pending_ids_are_sorted_and_exclude_fulfilled() {
        let mut ledger = ledger();
        for n in [9, 3, 6] {
            ledger.register(id(n)).unwrap();
        }
        ledger.fulfill(id(6), 1).unwrap();
        assert_eq!(ledger.pending_ids(), vec![id(3), id(9)]);
    }

    #[test]
    fn snapshot_restore_preserves_statuses() {
        let mut ledger = ledger();
        ledger.register(id(1)).unwrap();
        ledger.register(id(2)).unwrap();
        ledger.register(id(3)).unwrap();
        ledger.fulfill(id(2), 20).unwrap();
        ledger.fulfill(id(3), 30).unwrap();
        ledger.consume(id(3)).unwrap();

        let json = serde_json::to_string(&ledger.snapshot()).unwrap();
        let entries: Vec<Request<u64>> = serde_json::from_str(&json).unwrap();
        let mut restored = RequestLedger::restore(entries, ManualClock::new(2_000)).unwrap();

        assert_eq!(restored.pending_ids(), vec![id(1)]);
        assert_eq!(restored.consume(id(2)), Ok(20));
        assert_eq!(restored.consume(id(3)), Err(LedgerError::AlreadyConsumed(id(3))));
    }

    #[test]
    fn restore_rejects_duplicate_ids() {
        let entry = Request::<u64>::pending(id(4), 0);
        let result = RequestLedger::restore(vec![entry.clone(), entry], ManualClock::new(0));
        assert!(matches!(result, Err(LedgerError::DuplicateRequest(d)) if d == id(4)));
    }
}
