//! Fulfillment engine: consumes randomness request events, computes the
//! answer and delivers it through the fulfillment gateway.
//!
//! For each request the fulfiller:
//! 1. Computes the HMAC-SHA256 base randomness for the request.
//! 2. Expands it into `num_words` words.
//! 3. Fulfills the request as the configured forwarder and persists the ledger.
//!
//! A fulfillment whose snapshot write fails still counts as delivered: the
//! in-memory ledger holds the words and the next successful write carries
//! them to disk.

use anyhow::Result;
use request_ledger::expand_randomness;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{debug, error, info, instrument, warn};

use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::oracle::{Oracle, OracleError, RandomnessRequestedEvent};
use crate::store;
use crate::vrf::compute_randomness;

/// Ledger and gateway rejections are ordering violations, not transient faults.
fn is_non_retryable(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<OracleError>(),
        Some(OracleError::Ledger(_) | OracleError::Gateway(_))
    )
}

/// Outcome of a delivered fulfillment.
#[derive(Debug)]
pub enum Delivery {
    /// The ledger snapshot reflects the fulfillment.
    Persisted,
    /// Fulfilled in memory, but the snapshot write failed.
    Unpersisted(anyhow::Error),
}

/// Queue re-delivery of requests that were still pending at the last snapshot.
///
/// Must run after [`run_fulfiller`] has been spawned on the receiving end,
/// since the backlog may exceed the channel capacity.
pub async fn catch_up_pending_requests(
    oracle: &Mutex<Oracle>,
    tx: &mpsc::Sender<RandomnessRequestedEvent>,
) {
    let pending = oracle.lock().await.pending_events();
    info!(count = pending.len(), "Found pending requests");

    for event in pending {
        debug!(request_id = %event.request_id, "Queued pending request");
        if tx.send(event).await.is_err() {
            error!("Channel closed while catching up pending requests");
            return;
        }
    }
}

/// Main fulfiller loop.
pub async fn run_fulfiller(
    config: AppConfig,
    oracle: Arc<Mutex<Oracle>>,
    mut rx: mpsc::Receiver<RandomnessRequestedEvent>,
    pending_count: Arc<AtomicU64>,
    metrics: Arc<Metrics>,
) {
    let semaphore = Arc::new(Semaphore::new(config.fulfillment_concurrency));

    while let Some(event) = rx.recv().await {
        pending_count.fetch_add(1, Ordering::Relaxed);

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                error!("Semaphore closed, stopping fulfiller");
                break;
            }
        };
        let cfg = config.clone();
        let oracle = oracle.clone();
        let pending = pending_count.clone();
        let met = metrics.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let start = Instant::now();

            info!(
                request_id = %event.request_id,
                num_words = event.num_words,
                requested_at = event.requested_at,
                "Fulfilling randomness request"
            );

            match fulfill_request(&cfg, &oracle, &event).await {
                Ok(delivery) => {
                    let latency_ms = start.elapsed().as_millis() as u64;
                    met.record_fulfillment(latency_ms);
                    match delivery {
                        Delivery::Persisted => {
                            info!(request_id = %event.request_id, latency_ms, "Fulfilled successfully");
                        }
                        Delivery::Unpersisted(e) => {
                            met.record_snapshot_failure();
                            warn!(
                                request_id = %event.request_id,
                                latency_ms,
                                error = %format!("{e:#}"),
                                "Fulfilled, but snapshot write failed"
                            );
                        }
                    }
                }
                Err(e) => handle_fulfillment_error(&event, e, &met),
            }

            pending.fetch_sub(1, Ordering::Relaxed);
        });
    }

    info!("Fulfiller channel closed, shutting down");
}

fn handle_fulfillment_error(
    event: &RandomnessRequestedEvent,
    error: anyhow::Error,
    metrics: &Metrics,
) {
    if is_non_retryable(&error) {
        metrics.record_skip();
        warn!(
            request_id = %event.request_id,
            reason = %error,
            "Skipping request (non-retryable)"
        );
    } else {
        metrics.record_failure();
        error!(
            request_id = %event.request_id,
            error = %format!("{error:#}"),
            "Failed to fulfill"
        );
    }
}

/// Compute the random words for `event` and deliver them.
///
/// Errors are returned only when the request was not fulfilled.
#[instrument(skip_all, fields(request_id = %event.request_id))]
pub async fn fulfill_request(
    config: &AppConfig,
    oracle: &Mutex<Oracle>,
    event: &RandomnessRequestedEvent,
) -> Result<Delivery> {
    let randomness = compute_randomness(
        &config.hmac_secret,
        &event.seed,
        event.requested_at,
        &event.request_id,
    );
    let words = expand_randomness(&randomness, event.num_words);

    let mut oracle = oracle.lock().await;
    oracle.fulfill(&config.forwarder_id, event.request_id, words)?;
    match store::persist(config, &oracle).await {
        Ok(()) => Ok(Delivery::Persisted),
        Err(e) => Ok(Delivery::Unpersisted(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use request_ledger::{ForwarderId, FulfillmentGateway, GatewayError, LedgerError};
    use std::time::Duration;

    fn config() -> AppConfig {
        AppConfig {
            hmac_secret: b"test-secret".to_vec(),
            http_port: 0,
            fulfillment_concurrency: 2,
            max_num_words: 4,
            forwarder_id: ForwarderId::new("node"),
            snapshot_path: None,
        }
    }

    fn oracle() -> Mutex<Oracle> {
        let gateway = FulfillmentGateway::new([ForwarderId::new("node")]);
        Mutex::new(Oracle::new(gateway, 4))
    }

    #[tokio::test]
    async fn fulfills_with_expanded_words() {
        let config = config();
        let oracle = oracle();
        let event = oracle.lock().await.request([7; 32], 3).unwrap();

        let delivery = fulfill_request(&config, &oracle, &event).await.unwrap();
        assert!(matches!(delivery, Delivery::Persisted));

        let expected = expand_randomness(
            &compute_randomness(b"test-secret", &[7; 32], event.requested_at, &event.request_id),
            3,
        );
        let mut guard = oracle.lock().await;
        assert_eq!(guard.consume(event.request_id).unwrap(), expected);
    }

    #[tokio::test]
    async fn second_delivery_is_non_retryable() {
        let config = config();
        let oracle = oracle();
        let event = oracle.lock().await.request([7; 32], 1).unwrap();

        fulfill_request(&config, &oracle, &event).await.unwrap();
        let err = fulfill_request(&config, &oracle, &event).await.unwrap_err();
        assert!(is_non_retryable(&err));
        assert!(matches!(
            err.downcast_ref::<OracleError>(),
            Some(OracleError::Gateway(GatewayError::Ledger(
                LedgerError::AlreadyFulfilled(_)
            )))
        ));
    }

    #[test]
    fn io_failures_are_retryable() {
        let err = anyhow::anyhow!("disk full");
        assert!(!is_non_retryable(&err));
    }

    #[tokio::test]
    async fn loop_drains_channel() {
        let config = config();
        let oracle = Arc::new(oracle());
        let metrics = Arc::new(Metrics::new());
        let pending = Arc::new(AtomicU64::new(0));
        let (tx, rx) = mpsc::channel(8);

        let event = oracle.lock().await.request([1; 32], 1).unwrap();
        tx.send(event.clone()).await.unwrap();
        drop(tx);

        run_fulfiller(config, oracle.clone(), rx, pending.clone(), metrics.clone()).await;

        // The spawned task may still be running once the loop exits.
        for _ in 0..100 {
            if pending.load(Ordering::Relaxed) == 0
                && metrics.requests_fulfilled.load(Ordering::Relaxed) == 1
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(metrics.requests_fulfilled.load(Ordering::Relaxed), 1);
        assert!(oracle.lock().await.pending_events().is_empty());
    }

    async fn wait_until_fulfilled(oracle: &Mutex<Oracle>, pending: &AtomicU64) {
        for _ in 0..500 {
            if pending.load(Ordering::Relaxed) == 0 && oracle.lock().await.pending_events().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn failed_snapshot_write_still_delivers() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            snapshot_path: Some(dir.path().join("missing").join("ledger.json")),
            ..config()
        };
        let oracle = oracle();
        let event = oracle.lock().await.request([2; 32], 1).unwrap();

        let delivery = fulfill_request(&config, &oracle, &event).await.unwrap();
        assert!(matches!(delivery, Delivery::Unpersisted(_)));
        let guard = oracle.lock().await;
        assert!(guard.get(&event.request_id).unwrap().status.is_fulfilled());
    }

    #[tokio::test]
    async fn snapshot_failures_are_not_counted_as_failed_fulfillments() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            snapshot_path: Some(dir.path().join("missing").join("ledger.json")),
            ..config()
        };
        let oracle = Arc::new(oracle());
        let metrics = Arc::new(Metrics::new());
        let pending = Arc::new(AtomicU64::new(0));
        let (tx, rx) = mpsc::channel(8);

        let event = oracle.lock().await.request([2; 32], 1).unwrap();
        tx.send(event).await.unwrap();
        drop(tx);

        run_fulfiller(config, oracle.clone(), rx, pending.clone(), metrics.clone()).await;
        wait_until_fulfilled(&oracle, &pending).await;

        assert_eq!(metrics.requests_fulfilled.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.snapshot_failures.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.requests_failed.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn catch_up_backlog_larger_than_channel() {
        let oracle = Arc::new(oracle());
        for n in 0..40u8 {
            oracle.lock().await.request([n; 32], 1).unwrap();
        }
        let metrics = Arc::new(Metrics::new());
        let pending = Arc::new(AtomicU64::new(0));
        let (tx, rx) = mpsc::channel(4);

        let fulfiller = tokio::spawn(run_fulfiller(
            config(),
            oracle.clone(),
            rx,
            pending.clone(),
            metrics.clone(),
        ));
        let caught_up =
            tokio::time::timeout(Duration::from_secs(10), catch_up_pending_requests(&oracle, &tx)).await;
        assert!(caught_up.is_ok());

        drop(tx);
        fulfiller.await.unwrap();
        wait_until_fulfilled(&oracle, &pending).await;

        assert!(oracle.lock().await.pending_events().is_empty());
        assert_eq!(metrics.requests_fulfilled.load(Ordering::Relaxed), 40);
    }
}
