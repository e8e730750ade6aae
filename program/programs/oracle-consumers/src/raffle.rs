use request_ledger::{select_index_wide, Clock, LedgerError, RandomWords, RequestId, RequestLedger};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Error codes for the raffle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RaffleError {
    /// Entries and draw requests are only accepted while the raffle is open.
    #[error("Raffle is not open")]
    NotOpen,
    /// Attempted to draw with an empty pool.
    #[error("Raffle has no participants")]
    NoParticipants,
    /// Attempted to settle without a draw in progress.
    #[error("No draw is in progress")]
    NotDrawing,
    /// The fulfilled randomness contained no words.
    #[error("Randomness for request {0} is empty")]
    EmptyRandomness(RequestId),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Raffle lifecycle: `Open -> Drawing -> Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RaffleState {
    /// Accepting entries.
    Open,
    /// Waiting on the randomness for `request_id`.
    Drawing { request_id: RequestId },
}

/// A raffle whose winner is picked with oracle randomness.
///
/// 1. **Enter**: participants join while the raffle is `Open`. Each entry is
///    one ticket, so entering twice doubles the odds.
/// 2. **Draw**: [`request_draw`](Self::request_draw) registers the randomness
///    request and moves to `Drawing`.
/// 3. **Settle**: once fulfilled, [`settle`](Self::settle) consumes the
///    randomness, picks `word mod entries` and reopens with an empty pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Raffle {
    state: RaffleState,
    participants: Vec<String>,
    recent_winner: Option<String>,
    draws: u64,
}

impl Default for Raffle {
    fn default() -> Self {
        Self::new()
    }
}

impl Raffle {
    pub fn new() -> Self {
        Self {
            state: RaffleState::Open,
            participants: Vec::new(),
            recent_winner: None,
            draws: 0,
        }
    }

    pub fn state(&self) -> RaffleState {
        self.state
    }

    pub fn participants(&self) -> &[String] {
        &self.participants
    }

    pub fn recent_winner(&self) -> Option<&str> {
        self.recent_winner.as_deref()
    }

    /// Number of completed draws.
    pub fn draws(&self) -> u64 {
        self.draws
    }

    pub fn enter(&mut self, participant: impl Into<String>) -> Result<(), RaffleError> {
        if self.state != RaffleState::Open {
            return Err(RaffleError::NotOpen);
        }
        let participant = participant.into();
        info!(participant = %participant, entries = self.participants.len() + 1, "Raffle entered");
        self.participants.push(participant);
        Ok(())
    }

    /// Close entries and register the randomness request `request_id`.
    pub fn request_draw<C: Clock>(
        &mut self,
        ledger: &mut RequestLedger<RandomWords, C>,
        request_id: RequestId,
    ) -> Result<(), RaffleError> {
        if self.state != RaffleState::Open {
            return Err(RaffleError::NotOpen);
        }
        if self.participants.is_empty() {
            return Err(RaffleError::NoParticipants);
        }

        ledger.register(request_id)?;
        self.state = RaffleState::Drawing { request_id };
        info!(request_id = %request_id, entries = self.participants.len(), "Raffle draw requested");
        Ok(())
    }

    /// Consume the fulfilled randomness, pick the winner and reopen.
    ///
    /// Fails with [`LedgerError::NotFulfilledYet`] while the oracle has not
    /// answered; the raffle stays in `Drawing` and can be settled later.
    pub fn settle<C: Clock>(
        &mut self,
        ledger: &mut RequestLedger<RandomWords, C>,
    ) -> Result<String, RaffleError> {
        let RaffleState::Drawing { request_id } = self.state else {
            return Err(RaffleError::NotDrawing);
        };

        let participants = &self.participants;
        let winner = ledger.consume_with(request_id, |words| {
            let word = words
                .first()
                .ok_or(RaffleError::EmptyRandomness(request_id))?;
            let index =
                select_index_wide(word, participants.len()).ok_or(RaffleError::NoParticipants)?;
            Ok::<_, RaffleError>(participants[index].clone())
        })?;

        self.participants.clear();
        self.recent_winner = Some(winner.clone());
        self.draws += 1;
        self.state = RaffleState::Open;

        info!(request_id = %request_id, winner = %winner, "Raffle settled");
        Ok(winner)
    }
}
