//! HTTP surface of the oracle node.
//!
//! - `POST /requests`: register a randomness request and queue it.
//! - `GET /requests/{id}`: request status and, once fulfilled, its words.
//! - `POST /requests/{id}/consume`: take the words exactly once.
//! - `GET /health`, `GET /status`, `GET /metrics`: probes and counters.

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use request_ledger::{GatewayError, LedgerError, ParseRequestIdError, RandomWords, RequestId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, warn};

use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::oracle::{Oracle, OracleError, RandomnessRequestedEvent};
use crate::store;

/// Shared application state accessible from HTTP handlers.
pub struct AppState {
    pub config: AppConfig,
    pub oracle: Arc<Mutex<Oracle>>,
    /// Number of fulfillments currently in-flight.
    pub pending_count: Arc<AtomicU64>,
    pub metrics: Arc<Metrics>,
    /// Queue feeding the fulfiller.
    pub tx: mpsc::Sender<RandomnessRequestedEvent>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid seed: expected 32 base64-encoded bytes")]
    InvalidSeed,
    #[error(transparent)]
    InvalidRequestId(#[from] ParseRequestIdError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("fulfillment queue is closed")]
    QueueClosed,
    #[error("failed to persist ledger: {0:#}")]
    Persistence(anyhow::Error),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidSeed | Self::InvalidRequestId(_) => StatusCode::BAD_REQUEST,
            Self::Oracle(OracleError::InvalidNumWords { .. }) => StatusCode::BAD_REQUEST,
            Self::Oracle(OracleError::Ledger(LedgerError::UnknownRequest(_))) => {
                StatusCode::NOT_FOUND
            }
            Self::Oracle(OracleError::Ledger(_)) => StatusCode::CONFLICT,
            Self::Oracle(OracleError::Gateway(GatewayError::Unauthorized(_))) => {
                StatusCode::FORBIDDEN
            }
            Self::Oracle(OracleError::Gateway(GatewayError::Ledger(_))) => StatusCode::CONFLICT,
            Self::Oracle(OracleError::CounterOverflow) | Self::QueueClosed => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": self.to_string() }))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    /// Base64-encoded 32-byte caller entropy.
    pub seed: String,
    #[serde(default = "default_num_words")]
    pub num_words: u32,
}

fn default_num_words() -> u32 {
    1
}

#[derive(Debug, Serialize)]
struct RequestView {
    request_id: RequestId,
    status: &'static str,
    requested_at: u64,
    fulfilled_at: Option<u64>,
    consumed_at: Option<u64>,
    random_words: Option<Vec<String>>,
}

fn encode_words(words: &RandomWords) -> Vec<String> {
    words.iter().map(|w| BASE64.encode(w)).collect()
}

fn decode_seed(seed: &str) -> Result<[u8; 32], ApiError> {
    let bytes = BASE64.decode(seed).map_err(|_| ApiError::InvalidSeed)?;
    bytes.try_into().map_err(|_| ApiError::InvalidSeed)
}

/// Liveness probe: returns 200 if the process is running.
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

/// Readiness / status probe: reports in-flight fulfillments and ledger size.
async fn status(data: web::Data<AppState>) -> HttpResponse {
    let pending = data.pending_count.load(Ordering::Relaxed);
    let oracle = data.oracle.lock().await;
    HttpResponse::Ok().json(serde_json::json!({
        "status": "running",
        "pending_fulfillments": pending,
        "pending_requests": oracle.pending_events().len(),
        "total_requests": oracle.len(),
    }))
}

async fn metrics(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.metrics.to_json())
}

/// Apply `f` to a copy of the oracle, persist the copy, then install it.
/// On any failure the live oracle is left as it was.
async fn commit<T>(
    config: &AppConfig,
    oracle: &mut Oracle,
    f: impl FnOnce(&mut Oracle) -> Result<T, OracleError>,
) -> Result<T, ApiError> {
    let mut staged = oracle.clone();
    let value = f(&mut staged)?;
    store::persist(config, &staged)
        .await
        .map_err(ApiError::Persistence)?;
    *oracle = staged;
    Ok(value)
}

async fn create_request(
    data: web::Data<AppState>,
    body: web::Json<CreateRequest>,
) -> Result<HttpResponse, ApiError> {
    let seed = decode_seed(&body.seed)?;

    // Taken before the ledger changes, so every registered request is queued.
    let permit = data.tx.reserve().await.map_err(|_| {
        error!("Fulfiller queue closed");
        ApiError::QueueClosed
    })?;

    let event = {
        let mut oracle = data.oracle.lock().await;
        commit(&data.config, &mut oracle, |staged| {
            staged.request(seed, body.num_words)
        })
        .await?
    };
    permit.send(event.clone());
    data.metrics.record_request();

    Ok(HttpResponse::Created().json(serde_json::json!({
        "request_id": event.request_id,
        "num_words": event.num_words,
        "requested_at": event.requested_at,
    })))
}

async fn get_request(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let request_id: RequestId = path.parse()?;
    let oracle = data.oracle.lock().await;
    let request = oracle
        .get(&request_id)
        .ok_or(OracleError::Ledger(LedgerError::UnknownRequest(request_id)))?;

    Ok(HttpResponse::Ok().json(RequestView {
        request_id,
        status: request.status.label(),
        requested_at: request.requested_at,
        fulfilled_at: request.fulfilled_at,
        consumed_at: request.consumed_at,
        random_words: request.payload().map(encode_words),
    }))
}

async fn consume_request(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let request_id: RequestId = path.parse()?;
    let words = {
        let mut oracle = data.oracle.lock().await;
        commit(&data.config, &mut oracle, |staged| staged.consume(request_id))
            .await
            .inspect_err(|e| {
                warn!(request_id = %request_id, error = %e, "Rejected consumption");
            })?
    };
    data.metrics.record_consumption();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "request_id": request_id,
        "random_words": encode_words(&words),
    })))
}

/// Register every route on an actix `App`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/status", web::get().to(status))
        .route("/metrics", web::get().to(metrics))
        .route("/requests", web::post().to(create_request))
        .route("/requests/{id}", web::get().to(get_request))
        .route("/requests/{id}/consume", web::post().to(consume_request));
}
