use std::collections::BTreeSet;

use request_ledger::{Clock, LedgerError, RequestId, RequestLedger};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Identifier of the chain a message originated on.
pub type ChainSelector = u64;

/// An inbound cross-chain message as delivered by the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainMessage {
    /// Assigned by the sending side; doubles as the ledger key.
    pub message_id: RequestId,
    pub source_chain: ChainSelector,
    pub sender: String,
    pub data: Vec<u8>,
}

/// The part of a message kept in the ledger until it is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedPacket {
    pub source_chain: ChainSelector,
    pub sender: String,
    pub data: Vec<u8>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrossChainError {
    #[error("source chain {0} is not allow-listed")]
    SourceChainNotAllowed(ChainSelector),
    #[error("sender {0} is not allow-listed")]
    SenderNotAllowed(String),
    #[error("message {0} does not carry UTF-8 text")]
    InvalidText(RequestId),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Accepts messages from allow-listed chains and senders and applies each once.
///
/// Receipt and application are separate steps: [`receive`](Self::receive)
/// records the packet in the ledger, [`apply`](Self::apply) consumes it.
/// A redelivered message id fails with [`LedgerError::DuplicateRequest`].
#[derive(Debug, Clone, Default)]
pub struct CrossChainReceiver {
    allowed_source_chains: BTreeSet<ChainSelector>,
    allowed_senders: BTreeSet<String>,
    last_message_id: Option<RequestId>,
    last_text: Option<String>,
}

impl CrossChainReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_source_chain(&mut self, chain: ChainSelector, allowed: bool) {
        if allowed {
            self.allowed_source_chains.insert(chain);
        } else {
            self.allowed_source_chains.remove(&chain);
        }
    }

    pub fn allow_sender(&mut self, sender: impl Into<String>, allowed: bool) {
        let sender = sender.into();
        if allowed {
            self.allowed_senders.insert(sender);
        } else {
            self.allowed_senders.remove(&sender);
        }
    }

    pub fn last_received(&self) -> Option<(RequestId, &str)> {
        Some((self.last_message_id?, self.last_text.as_deref()?))
    }

    pub fn receive<C: Clock>(
        &self,
        ledger: &mut RequestLedger<ReceivedPacket, C>,
        message: CrossChainMessage,
    ) -> Result<(), CrossChainError> {
        if !self.allowed_source_chains.contains(&message.source_chain) {
            warn!(message_id = %message.message_id, source_chain = message.source_chain, "Message from unknown chain");
            return Err(CrossChainError::SourceChainNotAllowed(message.source_chain));
        }
        if !self.allowed_senders.contains(&message.sender) {
            warn!(message_id = %message.message_id, sender = %message.sender, "Message from unknown sender");
            return Err(CrossChainError::SenderNotAllowed(message.sender));
        }

        let id = message.message_id;
        ledger.register(id)?;
        ledger.fulfill(
            id,
            ReceivedPacket {
                source_chain: message.source_chain,
                sender: message.sender,
                data: message.data,
            },
        )?;
        info!(message_id = %id, "Cross-chain message received");
        Ok(())
    }

    /// Apply a received message, recording its text as the latest one.
    pub fn apply<C: Clock>(
        &mut self,
        ledger: &mut RequestLedger<ReceivedPacket, C>,
        message_id: RequestId,
    ) -> Result<&str, CrossChainError> {
        let text = ledger.consume_with(message_id, |packet| {
            String::from_utf8(packet.data.clone()).map_err(|_| CrossChainError::InvalidText(message_id))
        })?;

        info!(message_id = %message_id, "Cross-chain message applied");
        self.last_message_id = Some(message_id);
        Ok(self.last_text.insert(text).as_str())
    }
}
