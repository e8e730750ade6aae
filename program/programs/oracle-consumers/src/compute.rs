use request_ledger::{Clock, LedgerError, RequestId, RequestLedger};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Response to an off-chain compute request. Exactly one side is normally non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComputeResponse {
    pub response: Vec<u8>,
    pub error: Vec<u8>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComputeError {
    #[error("request {0} is still in flight")]
    RequestInFlight(RequestId),
    #[error("no compute request is in flight")]
    NothingRequested,
    /// The response is not a big-endian two's-complement integer that fits in 128 bits.
    #[error("malformed response for request {id}: {len} bytes")]
    MalformedResponse { id: RequestId, len: usize },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Where the consumer is in its request cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkStatus {
    Idle,
    Requested { request_id: RequestId },
    Completed { request_id: RequestId, result: i128 },
    Errored { request_id: RequestId, error: String },
}

/// Sends one compute request at a time and records the decoded result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConsumer {
    status: WorkStatus,
    completed: u64,
}

impl Default for ComputeConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeConsumer {
    pub fn new() -> Self {
        Self {
            status: WorkStatus::Idle,
            completed: 0,
        }
    }

    pub fn status(&self) -> &WorkStatus {
        &self.status
    }

    /// Number of responses applied, successful or not.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn last_result(&self) -> Option<i128> {
        match self.status {
            WorkStatus::Completed { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Register `request_id`, issued by the compute network, as in flight.
    pub fn send_request<C: Clock>(
        &mut self,
        ledger: &mut RequestLedger<ComputeResponse, C>,
        request_id: RequestId,
    ) -> Result<(), ComputeError> {
        if let WorkStatus::Requested { request_id: current } = self.status {
            return Err(ComputeError::RequestInFlight(current));
        }
        ledger.register(request_id)?;
        self.status = WorkStatus::Requested { request_id };
        info!(request_id = %request_id, "Compute request sent");
        Ok(())
    }

    /// Consume the fulfilled response and record its outcome.
    ///
    /// A malformed response leaves both the ledger entry and this consumer
    /// untouched.
    pub fn apply<C: Clock>(
        &mut self,
        ledger: &mut RequestLedger<ComputeResponse, C>,
    ) -> Result<&WorkStatus, ComputeError> {
        let WorkStatus::Requested { request_id } = self.status else {
            return Err(ComputeError::NothingRequested);
        };

        let status = ledger.consume_with(request_id, |response| -> Result<WorkStatus, ComputeError> {
            if !response.error.is_empty() {
                let error = String::from_utf8_lossy(&response.error).into_owned();
                return Ok(WorkStatus::Errored { request_id, error });
            }
            let result = decode_int(&response.response).ok_or(ComputeError::MalformedResponse {
                id: request_id,
                len: response.response.len(),
            })?;
            Ok(WorkStatus::Completed { request_id, result })
        })?;

        match &status {
            WorkStatus::Errored { error, .. } => {
                warn!(request_id = %request_id, error = %error, "Compute request errored")
            }
            _ => info!(request_id = %request_id, "Compute result applied"),
        }
        self.status = status;
        self.completed += 1;
        Ok(&self.status)
    }
}

/// Decode 1 to 32 big-endian two's-complement bytes into an `i128`.
fn decode_int(bytes: &[u8]) -> Option<i128> {
    if bytes.is_empty() || bytes.len() > 32 {
        return None;
    }
    let negative = bytes[0] & 0x80 != 0;
    let fill = if negative { 0xff } else { 0x00 };

    let (head, tail) = bytes.split_at(bytes.len().saturating_sub(16));
    if head.iter().any(|b| *b != fill) {
        return None;
    }
    let mut buf = [fill; 16];
    buf[16 - tail.len()..].copy_from_slice(tail);
    let value = i128::from_be_bytes(buf);
    // Sign-extension bytes must agree with the sign of what remains.
    if !head.is_empty() && (value < 0) != negative {
        return None;
    }
    Some(value)
}
