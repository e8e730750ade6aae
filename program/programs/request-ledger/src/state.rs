use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::ParseRequestIdError;

/// Opaque identifier correlating an outbound request with its response.
///
/// Assigned by whoever issues the external call; the ledger never generates
/// one. Rendered as `0x`-prefixed, zero-padded lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RequestId(pub [u8; 32]);

impl RequestId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Big-endian into the low-order bytes, the `bytes32(uint256(x))` layout.
impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }
}

impl From<[u8; 32]> for RequestId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({self})")
    }
}

impl FromStr for RequestId {
    type Err = ParseRequestIdError;

    /// Accepts 1 to 64 hex digits after `0x`; shorter inputs are left-padded.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .filter(|d| !d.is_empty())
            .ok_or_else(|| ParseRequestIdError::MissingPrefix(s.to_string()))?;
        if digits.len() > 64 {
            return Err(ParseRequestIdError::TooLong(digits.len()));
        }

        let mut bytes = [0u8; 32];
        // Walk from the least significant digit so short ids right-align.
        for (i, c) in digits.chars().rev().enumerate() {
            let nibble = c.to_digit(16).ok_or(ParseRequestIdError::InvalidDigit(c))? as u8;
            let byte = &mut bytes[31 - i / 2];
            if i % 2 == 0 {
                *byte |= nibble;
            } else {
                *byte |= nibble << 4;
            }
        }
        Ok(Self(bytes))
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Lifecycle of a single request.
///
/// Transitions are one-way: `Pending -> Fulfilled -> Consumed`. The payload is
/// retained after consumption so the entry remains a complete audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RequestStatus<P> {
    /// Registered, awaiting the fulfillment callback.
    Pending,
    /// Response recorded, not yet applied by the domain consumer.
    Fulfilled { payload: P },
    /// Response applied; any further consumption is rejected.
    Consumed { payload: P },
}

impl<P> RequestStatus<P> {
    pub fn is_fulfilled(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn is_consumed(&self) -> bool {
        matches!(self, Self::Consumed { .. })
    }

    pub fn payload(&self) -> Option<&P> {
        match self {
            Self::Pending => None,
            Self::Fulfilled { payload } | Self::Consumed { payload } => Some(payload),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fulfilled { .. } => "fulfilled",
            Self::Consumed { .. } => "consumed",
        }
    }
}

/// One outstanding or completed asynchronous request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request<P> {
    pub id: RequestId,
    #[serde(flatten)]
    pub status: RequestStatus<P>,
    /// Clock reading (unix seconds) at registration.
    pub requested_at: u64,
    pub fulfilled_at: Option<u64>,
    pub consumed_at: Option<u64>,
}

impl<P> Request<P> {
    pub(crate) fn pending(id: RequestId, requested_at: u64) -> Self {
        Self {
            id,
            status: RequestStatus::Pending,
            requested_at,
            fulfilled_at: None,
            consumed_at: None,
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        self.status.is_fulfilled()
    }

    pub fn is_consumed(&self) -> bool {
        self.status.is_consumed()
    }

    pub fn payload(&self) -> Option<&P> {
        self.status.payload()
    }
}
