//! Oracle node
//!
//! Off-chain service that accepts randomness requests, tracks them in a
//! request ledger and fulfills them automatically. Runs two concurrent
//! subsystems:
//!
//! - **Fulfiller**: consumes request events and delivers random words
//!   through the fulfillment gateway.
//! - **HTTP server**: request intake and consumption, plus liveness
//!   (`/health`), readiness (`/status`) and `/metrics` probes.
//!
//! On startup the ledger snapshot is restored and any request still pending
//! is queued again.

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use request_ledger::FulfillmentGateway;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod api;
mod config;
mod fulfiller;
mod metrics;
mod oracle;
mod store;
mod vrf;

use api::AppState;
use config::AppConfig;
use metrics::Metrics;
use oracle::Oracle;

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,actix_server=warn")),
        )
        .with_target(true)
        .with_ansi(true)
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    info!(
        forwarder = %config.forwarder_id,
        max_num_words = config.max_num_words,
        concurrency = config.fulfillment_concurrency,
        "Starting oracle node"
    );

    let gateway = FulfillmentGateway::new([config.forwarder_id.clone()]);
    let oracle = match &config.snapshot_path {
        Some(path) => match store::load(path).await? {
            Some(snapshot) => {
                info!(path = %path.display(), requests = snapshot.requests.len(), "Restored snapshot");
                Oracle::from_snapshot(snapshot, gateway, config.max_num_words)
                    .context("snapshot is inconsistent")?
            }
            None => Oracle::new(gateway, config.max_num_words),
        },
        None => Oracle::new(gateway, config.max_num_words),
    };
    let oracle = Arc::new(Mutex::new(oracle));

    let pending_count = Arc::new(AtomicU64::new(0));
    let metrics = Arc::new(Metrics::new());
    let (tx, rx) = mpsc::channel(256);

    // Background: consume events and deliver fulfillments.
    let fulfiller_config = config.clone();
    let fulfiller_oracle = oracle.clone();
    let fulfiller_pending = pending_count.clone();
    let fulfiller_metrics = metrics.clone();
    tokio::spawn(async move {
        fulfiller::run_fulfiller(
            fulfiller_config,
            fulfiller_oracle,
            rx,
            fulfiller_pending,
            fulfiller_metrics,
        )
        .await;
    });

    // Pick up requests that were registered but never fulfilled before a restart.
    let catch_up_oracle = oracle.clone();
    let catch_up_tx = tx.clone();
    tokio::spawn(async move {
        fulfiller::catch_up_pending_requests(&catch_up_oracle, &catch_up_tx).await;
    });

    let addr = ("0.0.0.0", config.http_port);
    let state = web::Data::new(AppState {
        config,
        oracle,
        pending_count,
        metrics,
        tx,
    });

    info!(addr = %format!("{}:{}", addr.0, addr.1), "Starting HTTP server");

    HttpServer::new(move || App::new().app_data(state.clone()).configure(api::configure))
        .bind(addr)
        .context("failed to bind HTTP server")?
        .run()
        .await
        .context("HTTP server failed")
}
